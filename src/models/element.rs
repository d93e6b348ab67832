use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Testing-oriented data attributes, in locator priority order
pub const TEST_DATA_ATTRIBUTES: [&str; 5] = ["data-testid", "data-test", "data-id", "data-cy", "data-qa"];

/// One node on the path from an element up to the document root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSegment {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 1-based position among siblings with the same tag
    #[serde(default = "default_index")]
    pub index: u32,
    /// Number of siblings (self included) sharing the tag
    #[serde(default = "default_index")]
    pub same_tag_siblings: u32,
}

fn default_index() -> u32 {
    1
}

impl PathSegment {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            id: None,
            index: 1,
            same_tag_siblings: 1,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn nth(mut self, index: u32, of: u32) -> Self {
        self.index = index;
        self.same_tag_siblings = of;
        self
    }
}

/// Serializable capture of a DOM element, taken in the page at event time.
///
/// This is everything the host needs to build locators and classify the
/// field without touching the live node again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autocomplete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// `className` as reported by the page. SVG elements report an
    /// animated-string object here, which is read as absent.
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_connected")]
    pub connected: bool,
    /// Element first, document root last
    #[serde(default)]
    pub ancestry: Vec<PathSegment>,
}

fn default_connected() -> bool {
    true
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

impl ElementSnapshot {
    pub fn new(tag: &str) -> Self {
        let tag = tag.to_lowercase();
        Self {
            ancestry: vec![PathSegment::new(&tag)],
            tag,
            connected: true,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        if let Some(own) = self.ancestry.first_mut() {
            own.id = Some(id.to_string());
        }
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_type(mut self, input_type: &str) -> Self {
        self.input_type = Some(input_type.to_string());
        self
    }

    pub fn with_placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }

    pub fn with_autocomplete(mut self, autocomplete: &str) -> Self {
        self.autocomplete = Some(autocomplete.to_string());
        self
    }

    pub fn with_aria_label(mut self, label: &str) -> Self {
        self.aria_label = Some(label.to_string());
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn with_class(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    pub fn with_data(mut self, attr: &str, value: &str) -> Self {
        self.data_attributes.insert(attr.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Set this element's sibling position
    pub fn nth(mut self, index: u32, of: u32) -> Self {
        if let Some(own) = self.ancestry.first_mut() {
            own.index = index;
            own.same_tag_siblings = of;
        }
        self
    }

    /// Append the next ancestor up the tree
    pub fn within(mut self, ancestor: PathSegment) -> Self {
        self.ancestry.push(ancestor);
        self
    }

    /// Trimmed, non-empty attribute value
    pub fn attr(&self, value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    /// Identifier used in credential keys: id, then name, then `field`
    pub fn identifier(&self) -> String {
        self.attr(&self.id)
            .or_else(|| self.attr(&self.name))
            .unwrap_or_else(|| "field".to_string())
    }
}
