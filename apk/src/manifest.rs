use crate::error::Result;
use crate::res::Value;
use crate::xml::{Attribute, XmlEvent};
use serde::{Serialize, Serializer};
use std::fmt;

/// Metadata from the android [manifest element](https://developer.android.com/guide/topics/manifest/manifest-element)
/// and its children.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApkMeta {
    pub package_name: Option<String>,
    pub version_code: Option<u64>,
    pub version_name: Option<String>,
    pub install_location: Option<String>,
    pub shared_user_id: Option<String>,
    pub compile_sdk_version: Option<u32>,
    pub label: Option<String>,
    pub icon: Option<String>,
    pub debuggable: Option<bool>,
    #[serde(rename = "uses-sdk")]
    pub sdk: Sdk,
    #[serde(rename = "uses-feature")]
    pub uses_features: Vec<Feature>,
    #[serde(rename = "uses-permission")]
    pub uses_permissions: Vec<Permission>,
    #[serde(rename = "permission")]
    pub permissions: Vec<DeclaredPermission>,
    pub components: Vec<Component>,
}

/// Android [uses-sdk element](https://developer.android.com/guide/topics/manifest/uses-sdk-element).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sdk {
    pub min_sdk_version: Option<u32>,
    pub target_sdk_version: Option<u32>,
    pub max_sdk_version: Option<u32>,
}

/// Android [uses-feature element](https://developer.android.com/guide/topics/manifest/uses-feature-element).
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub name: Option<String>,
    pub required: bool,
    #[serde(serialize_with = "serialize_opengles_version")]
    pub opengles_version: Option<(u16, u16)>,
}

fn serialize_opengles_version<S>(
    version: &Option<(u16, u16)>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match version {
        Some((major, minor)) => serializer.serialize_some(&format!("{major}.{minor}")),
        None => serializer.serialize_none(),
    }
}

/// Android [uses-permission element](https://developer.android.com/guide/topics/manifest/uses-permission-element).
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub name: String,
    pub max_sdk_version: Option<u32>,
}

/// Android [permission element](https://developer.android.com/guide/topics/manifest/permission-element),
/// a permission the package defines.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredPermission {
    pub name: String,
    pub label: Option<String>,
    pub group: Option<String>,
    pub protection_level: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    Activity,
    ActivityAlias,
    Service,
    Receiver,
    Provider,
}

impl ComponentKind {
    fn from_element(name: &str) -> Option<Self> {
        Some(match name {
            "activity" => Self::Activity,
            "activity-alias" => Self::ActivityAlias,
            "service" => Self::Service,
            "receiver" => Self::Receiver,
            "provider" => Self::Provider,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::ActivityAlias => "activity-alias",
            Self::Service => "service",
            Self::Receiver => "receiver",
            Self::Provider => "provider",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An application component declared inside the application element.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub kind: ComponentKind,
    pub name: String,
    pub exported: Option<bool>,
    pub intent_filters: Vec<IntentFilter>,
}

/// Android [intent-filter element](https://developer.android.com/guide/topics/manifest/intent-filter-element)
/// of a component.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentFilter {
    pub actions: Vec<String>,
    pub categories: Vec<String>,
}

fn android_attr<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a Value> {
    attributes
        .iter()
        .find(|attr| attr.name == name && (attr.is_android() || attr.namespace.is_none()))
        .map(|attr| &attr.value)
}

fn attr_string(attributes: &[Attribute], name: &str) -> Option<String> {
    android_attr(attributes, name).map(|value| match value {
        Value::String(s) => s.clone(),
        value => value.to_string(),
    })
}

fn attr_u32(attributes: &[Attribute], name: &str) -> Option<u32> {
    android_attr(attributes, name)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn attr_bool(attributes: &[Attribute], name: &str) -> Option<bool> {
    android_attr(attributes, name).and_then(Value::as_bool)
}

fn install_location(value: &Value) -> String {
    match value.as_u64() {
        Some(0) => "auto".to_string(),
        Some(1) => "internalOnly".to_string(),
        Some(2) => "preferExternal".to_string(),
        _ => value.to_string(),
    }
}

fn protection_level(value: &Value) -> String {
    let Some(level) = value.as_u64() else {
        return value.to_string();
    };
    match level & 0xf {
        0 => "normal".to_string(),
        1 => "dangerous".to_string(),
        2 => "signature".to_string(),
        3 => "signatureOrSystem".to_string(),
        _ => format!("0x{level:x}"),
    }
}

impl ApkMeta {
    /// Collects the metadata in one pass over the manifest.
    pub fn from_events<I>(events: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<XmlEvent>>,
    {
        let mut meta = Self::default();
        let mut path: Vec<String> = vec![];
        for event in events {
            match event? {
                XmlEvent::StartElement {
                    name, attributes, ..
                } => {
                    let scope: Vec<&str> = path.iter().map(String::as_str).collect();
                    meta.element(&scope, &name, &attributes);
                    path.push(name);
                }
                XmlEvent::EndElement { .. } => {
                    path.pop();
                }
                _ => {}
            }
        }
        Ok(meta)
    }

    /// Records one element given the names of its ancestors, outermost first.
    fn element(&mut self, scope: &[&str], name: &str, attrs: &[Attribute]) {
        match (scope, name) {
            ([], "manifest") => {
                self.package_name = attr_string(attrs, "package");
                self.version_code = android_attr(attrs, "versionCode").and_then(Value::as_u64);
                self.version_name = attr_string(attrs, "versionName");
                self.install_location =
                    android_attr(attrs, "installLocation").map(install_location);
                self.shared_user_id = attr_string(attrs, "sharedUserId");
                self.compile_sdk_version = attr_u32(attrs, "compileSdkVersion");
            }
            (["manifest"], "uses-sdk") => {
                self.sdk = Sdk {
                    min_sdk_version: attr_u32(attrs, "minSdkVersion"),
                    target_sdk_version: attr_u32(attrs, "targetSdkVersion"),
                    max_sdk_version: attr_u32(attrs, "maxSdkVersion"),
                };
            }
            (["manifest"], "uses-permission" | "uses-permission-sdk-23") => {
                if let Some(name) = attr_string(attrs, "name") {
                    self.uses_permissions.push(Permission {
                        name,
                        max_sdk_version: attr_u32(attrs, "maxSdkVersion"),
                    });
                }
            }
            (["manifest"], "uses-feature") => {
                let opengles_version = attr_u32(attrs, "glEsVersion")
                    .map(|v| ((v >> 16) as u16, v as u16));
                self.uses_features.push(Feature {
                    name: attr_string(attrs, "name"),
                    required: attr_bool(attrs, "required").unwrap_or(true),
                    opengles_version,
                });
            }
            (["manifest"], "permission") => {
                if let Some(name) = attr_string(attrs, "name") {
                    self.permissions.push(DeclaredPermission {
                        name,
                        label: attr_string(attrs, "label"),
                        group: attr_string(attrs, "permissionGroup"),
                        protection_level:
                            android_attr(attrs, "protectionLevel").map(protection_level),
                    });
                }
            }
            (["manifest"], "application") => {
                self.label = attr_string(attrs, "label");
                self.icon = attr_string(attrs, "icon");
                self.debuggable = attr_bool(attrs, "debuggable");
            }
            (["manifest", "application"], name) => {
                if let Some(kind) = ComponentKind::from_element(name) {
                    self.components.push(Component {
                        kind,
                        name: attr_string(attrs, "name").unwrap_or_default(),
                        exported: attr_bool(attrs, "exported"),
                        intent_filters: vec![],
                    });
                }
            }
            (["manifest", "application", component], "intent-filter")
                if ComponentKind::from_element(component).is_some() =>
            {
                if let Some(component) = self.components.last_mut() {
                    component.intent_filters.push(IntentFilter::default());
                }
            }
            (["manifest", "application", component, "intent-filter"], "action" | "category")
                if ComponentKind::from_element(component).is_some() =>
            {
                let filter = self
                    .components
                    .last_mut()
                    .and_then(|component| component.intent_filters.last_mut());
                if let (Some(filter), Some(value)) = (filter, attr_string(attrs, "name")) {
                    match name {
                        "action" => filter.actions.push(value),
                        _ => filter.categories.push(value),
                    }
                }
            }
            _ => {}
        }
    }

    pub fn components(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(move |c| c.kind == kind)
    }
}
