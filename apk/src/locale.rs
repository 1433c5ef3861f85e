use crate::res::ResTableConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A BCP-47 style locale as far as resource tables care: language, script, region.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Locale {
    language: String,
    script: String,
    region: String,
}

#[derive(Debug, Error)]
#[error("invalid locale `{0}`")]
pub struct ParseLocaleError(String);

impl Locale {
    pub fn new(language: &str, region: &str) -> Self {
        Self::with_script(language, "", region)
    }

    pub fn with_script(language: &str, script: &str, region: &str) -> Self {
        let mut script = script.to_ascii_lowercase();
        if let Some(first) = script.get_mut(..1) {
            first.make_ascii_uppercase();
        }
        Self {
            language: language.to_ascii_lowercase(),
            script,
            region: region.to_ascii_uppercase(),
        }
    }

    /// `en-US`, the locale used when none is configured.
    pub fn en_us() -> Self {
        Self::new("en", "US")
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn is_empty(&self) -> bool {
        self.language.is_empty()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.language)?;
        if !self.script.is_empty() {
            write!(f, "-{}", self.script)?;
        }
        if !self.region.is_empty() {
            write!(f, "-{}", self.region)?;
        }
        Ok(())
    }
}

impl FromStr for Locale {
    type Err = ParseLocaleError;

    /// Accepts `en`, `en-US`, `en_US`, `en-rUS`, `zh-Hant-TW` and `b+sr+Latn+RS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseLocaleError(s.to_string());
        let parts: Vec<&str> = if let Some(rest) = s.strip_prefix("b+") {
            rest.split('+').collect()
        } else {
            s.split(['-', '_']).collect()
        };
        let (language, rest) = parts.split_first().ok_or_else(err)?;
        let alphabetic = language.chars().all(|c| c.is_ascii_alphabetic());
        if !(2..=3).contains(&language.len()) || !alphabetic {
            return Err(err());
        }
        let mut script = "";
        let mut region = "";
        for part in rest {
            let part = part
                .strip_prefix('r')
                .filter(|p| p.len() == 2)
                .unwrap_or(part);
            match part.len() {
                4 if script.is_empty() && region.is_empty() => script = part,
                2 | 3 if region.is_empty() => region = part,
                _ => return Err(err()),
            }
        }
        Ok(Self::with_script(language, script, region))
    }
}

/// Picks the value whose configuration best serves `target`:
///
/// 1. same language and region,
/// 2. same language, no region,
/// 3. no locale qualifier, preferring the configuration with no qualifier at all,
/// 4. the first configuration in [`ResTableConfig`] order.
pub fn best_match<'a, T>(
    target: &Locale,
    candidates: &'a BTreeMap<ResTableConfig, T>,
) -> Option<(&'a ResTableConfig, &'a T)> {
    let locales: Vec<_> = candidates
        .iter()
        .map(|(config, value)| (config.locale(), config, value))
        .collect();
    let script_matches =
        |l: &Locale| target.script.is_empty() || l.script.is_empty() || l.script == target.script;

    if !target.is_empty() {
        let exact = locales.iter().find(|(locale, _, _)| {
            locale.as_ref().is_some_and(|l| {
                l.language == target.language && l.region == target.region && script_matches(l)
            })
        });
        if let Some((_, config, value)) = exact {
            return Some((*config, *value));
        }
        let language = locales.iter().find(|(locale, _, _)| {
            locale.as_ref().is_some_and(|l| {
                l.language == target.language && l.region.is_empty() && script_matches(l)
            })
        });
        if let Some((_, config, value)) = language {
            return Some((*config, *value));
        }
    }

    candidates
        .iter()
        .find(|(config, _)| config.is_default())
        .or_else(|| candidates.iter().find(|(config, _)| !config.has_locale()))
        .or_else(|| candidates.iter().next())
}
