use anyhow::{Context, Result};
use apkparse::{ApkParser, EntrySource, Locale, ParserConfig, ResTableRef, ZipEntries};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the apk
    apk: PathBuf,
    /// Locale used to resolve string references, like `en-US` or `zh-Hant-TW`
    #[clap(long, default_value = "en-US")]
    locale: Locale,
    #[clap(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};
    tracing_log::LogTracer::init().ok();
    let env = std::env::var("APKDUMP_LOG").unwrap_or_else(|_| "error".into());
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_span_events(FmtSpan::ACTIVE | FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::new(env))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    let args = Args::parse();
    let config = ParserConfig {
        locale: args.locale,
        ..Default::default()
    };
    let source = ZipEntries::open(&args.apk, config.max_entry_size)?;
    let apk = ApkParser::with_config(source, config);
    args.command.run(&apk)
}

#[derive(Subcommand)]
enum Commands {
    /// Print AndroidManifest.xml as text
    Manifest,
    /// Print the manifest metadata as json
    Meta,
    /// List the locales of the resource table
    Locales,
    /// Print a binary xml entry as text
    Xml {
        /// Entry path, like `res/layout/main.xml`
        entry: String,
    },
    /// Print the signing certificates as json
    Certs,
    /// List the classes of every dex file
    Dex,
    /// Print the values of a resource id for every configuration
    Resolve {
        /// Resource id in hex, like `0x7f010000`
        id: String,
    },
}

fn parse_id(id: &str) -> Result<u32> {
    let parsed = match id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => id.parse(),
    };
    parsed.with_context(|| format!("invalid resource id `{id}`"))
}

impl Commands {
    pub fn run<S: EntrySource>(self, apk: &ApkParser<S>) -> Result<()> {
        match self {
            Self::Manifest => println!("{}", apk.manifest_xml()?),
            Self::Meta => println!("{}", serde_json::to_string_pretty(apk.apk_meta()?)?),
            Self::Locales => {
                for locale in apk.locales()? {
                    println!("{locale}");
                }
            }
            Self::Xml { entry } => match apk.translate_xml(&entry)? {
                Some(xml) => println!("{xml}"),
                None => anyhow::bail!("apk has no entry {entry}"),
            },
            Self::Certs => println!("{}", serde_json::to_string_pretty(apk.certificates()?)?),
            Self::Dex => {
                for (i, info) in apk.dex_infos()?.iter().enumerate() {
                    println!(
                        "# dex {} version {} ({} classes)",
                        i + 1,
                        info.header.version,
                        info.classes.len()
                    );
                    for class in &info.classes {
                        println!("{}", class.class_name());
                    }
                }
            }
            Self::Resolve { id } => {
                let id = parse_id(&id)?;
                let table = apk.resource_table()?;
                let entry = table
                    .entry(id)
                    .with_context(|| format!("no resource {}", ResTableRef::from(id)))?;
                let name = table
                    .resource_name(id)
                    .unwrap_or_else(|| ResTableRef::from(id).to_string());
                println!("{name}");
                for (config, value) in &entry.values {
                    let locale = config
                        .locale()
                        .map(|locale| locale.to_string())
                        .unwrap_or_else(|| "default".into());
                    println!("  [{locale}] {value}");
                }
                if let Some(value) = table.resolve(id, apk.preferred_locale()) {
                    println!("{}: {value}", apk.preferred_locale());
                }
            }
        }
        Ok(())
    }
}
