//! Billing item defaults.
//!
//! A fresh clinic starts with a small catalog of consultation fees and
//! medicine charges. The exporter seeds it when the billing collection is
//! empty, and `init --seed-billing` does the same on demand.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use super::record::Record;

/// Category of a billing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCategory {
    /// Consultation fees.
    Consultation,
    /// Dispensed medicine.
    Medicine,
}

/// One entry of the built-in catalog.
#[derive(Debug, Clone, Copy)]
pub struct DefaultBillingItem {
    pub id: u32,
    pub name: &'static str,
    pub category: BillingCategory,
    pub price: u32,
    pub unit: &'static str,
    pub description: &'static str,
}

/// The built-in catalog, in id order.
pub const DEFAULT_BILLING_ITEMS: [DefaultBillingItem; 7] = [
    DefaultBillingItem {
        id: 4001,
        name: "診金",
        category: BillingCategory::Consultation,
        price: 150,
        unit: "次",
        description: "中醫師診症費用",
    },
    DefaultBillingItem {
        id: 4002,
        name: "複診費",
        category: BillingCategory::Consultation,
        price: 120,
        unit: "次",
        description: "複診病人診症費用",
    },
    DefaultBillingItem {
        id: 4003,
        name: "急診費",
        category: BillingCategory::Consultation,
        price: 200,
        unit: "次",
        description: "急診或非辦公時間診症",
    },
    DefaultBillingItem {
        id: 4011,
        name: "中藥調劑費",
        category: BillingCategory::Medicine,
        price: 25,
        unit: "劑",
        description: "中藥材調劑及包裝費用",
    },
    DefaultBillingItem {
        id: 4012,
        name: "濃縮中藥粉",
        category: BillingCategory::Medicine,
        price: 15,
        unit: "包",
        description: "科學中藥濃縮粉劑",
    },
    DefaultBillingItem {
        id: 4013,
        name: "外用藥膏",
        category: BillingCategory::Medicine,
        price: 80,
        unit: "支",
        description: "中藥外用藥膏",
    },
    DefaultBillingItem {
        id: 4014,
        name: "藥酒",
        category: BillingCategory::Medicine,
        price: 120,
        unit: "瓶",
        description: "中藥浸製藥酒",
    },
];

impl DefaultBillingItem {
    /// Render as a record, stamped with `created_at`.
    #[must_use]
    pub fn to_record(&self, created_at: DateTime<Utc>) -> Record {
        let mut record = Record::new();
        record.insert("id".into(), Value::from(self.id));
        record.insert("name".into(), Value::from(self.name));
        record.insert(
            "category".into(),
            serde_json::to_value(self.category).unwrap_or(Value::Null),
        );
        record.insert("price".into(), Value::from(self.price));
        record.insert("unit".into(), Value::from(self.unit));
        record.insert("description".into(), Value::from(self.description));
        record.insert("active".into(), Value::Bool(true));
        record.insert(
            "createdAt".into(),
            Value::from(created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record
    }
}

/// The whole default catalog as records.
#[must_use]
pub fn default_billing_records(created_at: DateTime<Utc>) -> Vec<Record> {
    DEFAULT_BILLING_ITEMS
        .iter()
        .map(|item| item.to_record(created_at))
        .collect()
}
