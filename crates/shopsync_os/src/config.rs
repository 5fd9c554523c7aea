#![forbid(unsafe_code)]

use std::env;

use shopsync_contracts::RecordCategory;

pub const IDENTIFIER_FIELD_DEFAULT: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRoutingConfig {
    pub customer_table: String,
    pub order_table: String,
    pub product_table: String,
    pub default_table: String,
}

impl TableRoutingConfig {
    pub fn mvp_default() -> Self {
        Self {
            customer_table: "Customers".to_string(),
            order_table: "Orders".to_string(),
            product_table: "Products".to_string(),
            default_table: "Sheet1".to_string(),
        }
    }

    pub fn table_for(&self, category: &RecordCategory) -> &str {
        match category {
            RecordCategory::Customer => self.customer_table.as_str(),
            RecordCategory::Order => self.order_table.as_str(),
            RecordCategory::Product => self.product_table.as_str(),
            RecordCategory::Other(_) => self.default_table.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub identifier_field: String,
    pub routing: TableRoutingConfig,
}

impl SyncConfig {
    pub fn mvp_default() -> Self {
        Self {
            identifier_field: IDENTIFIER_FIELD_DEFAULT.to_string(),
            routing: TableRoutingConfig::mvp_default(),
        }
    }

    pub fn from_env() -> Self {
        Self::from_var_map(|key| env::var(key).ok())
    }

    pub fn from_var_map<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::mvp_default();
        let pick = |key: &str, fallback: String| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };
        Self {
            identifier_field: pick("SHOPSYNC_IDENTIFIER_FIELD", defaults.identifier_field),
            routing: TableRoutingConfig {
                customer_table: pick("SHOPSYNC_TABLE_CUSTOMER", defaults.routing.customer_table),
                order_table: pick("SHOPSYNC_TABLE_ORDER", defaults.routing.order_table),
                product_table: pick("SHOPSYNC_TABLE_PRODUCT", defaults.routing.product_table),
                default_table: pick("SHOPSYNC_TABLE_DEFAULT", defaults.routing.default_table),
            },
        }
    }
}
