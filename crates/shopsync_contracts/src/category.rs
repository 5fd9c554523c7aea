#![forbid(unsafe_code)]

use std::fmt;

/// Entity category, always taken from the route a notification arrived on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordCategory {
    Customer,
    Order,
    Product,
    Other(String),
}

impl RecordCategory {
    /// Accepts singular or plural route segments, case-insensitive.
    pub fn from_route(segment: &str) -> Self {
        let normalized = segment.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "customer" | "customers" => RecordCategory::Customer,
            "order" | "orders" => RecordCategory::Order,
            "product" | "products" => RecordCategory::Product,
            _ => RecordCategory::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordCategory::Customer => "customer",
            RecordCategory::Order => "order",
            RecordCategory::Product => "product",
            RecordCategory::Other(name) => name.as_str(),
        }
    }

    /// Key under which a bulk payload of this category carries its records.
    pub fn plural_key(&self) -> Option<&'static str> {
        match self {
            RecordCategory::Customer => Some("customers"),
            RecordCategory::Order => Some("orders"),
            RecordCategory::Product => Some("products"),
            RecordCategory::Other(_) => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, RecordCategory::Other(_))
    }
}

impl fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookOperation {
    Create,
    Update,
    Delete,
}

impl WebhookOperation {
    pub fn parse(segment: &str) -> Option<Self> {
        match segment.trim().to_ascii_lowercase().as_str() {
            "create" => Some(WebhookOperation::Create),
            "update" => Some(WebhookOperation::Update),
            "delete" => Some(WebhookOperation::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WebhookOperation::Create => "create",
            WebhookOperation::Update => "update",
            WebhookOperation::Delete => "delete",
        }
    }

    /// Create and update are both applied as an upsert.
    pub fn is_upsert(self) -> bool {
        matches!(self, WebhookOperation::Create | WebhookOperation::Update)
    }
}

impl fmt::Display for WebhookOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
