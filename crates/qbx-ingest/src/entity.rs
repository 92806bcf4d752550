//! Remote entity types and their per-entity configuration
//!
//! One [`EntitySpec`] carries everything the pipeline needs to know about an
//! entity: the remote name, the query, which JSON fields date a record, and
//! where its envelopes land.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IngestError;
use crate::store::TableRef;

/// Schema holding the raw landing tables
pub const RAW_SCHEMA: &str = "raw";

/// A JSON field that can date a remote record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateField {
    /// Transaction date (`TxnDate`), present on transactional entities
    TxnDate,
    /// `MetaData.LastUpdatedTime`, present on every entity
    LastUpdatedTime,
}

impl DateField {
    /// JSON pointer to the field inside a remote record
    pub fn pointer(&self) -> &'static str {
        match self {
            DateField::TxnDate => "/TxnDate",
            DateField::LastUpdatedTime => "/MetaData/LastUpdatedTime",
        }
    }

    /// Non-empty string value of this field, if the record has one
    pub fn read<'a>(&self, record: &'a Value) -> Option<&'a str> {
        record
            .pointer(self.pointer())
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Configuration for extracting and loading one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    /// Remote entity name, also the key under `QueryResponse`
    pub remote_name: String,
    /// Plural label written into `request_payload.entity_type`
    pub label: String,
    /// Query sent to the remote endpoint
    pub query: String,
    /// Date fields tried in order when filtering
    pub date_fields: Vec<DateField>,
    /// Destination table
    pub destination: TableRef,
}

impl EntitySpec {
    /// Spec selecting every record of `remote_name`.
    pub fn new(
        remote_name: impl Into<String>,
        label: impl Into<String>,
        date_fields: Vec<DateField>,
        destination: TableRef,
    ) -> Self {
        let remote_name = remote_name.into();
        Self {
            query: format!("SELECT * FROM {remote_name}"),
            remote_name,
            label: label.into(),
            date_fields,
            destination,
        }
    }
}

/// Entity types with built-in pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customer,
    Invoice,
    Item,
}

impl EntityKind {
    /// Every built-in entity, in the order `run-all` processes them
    pub const ALL: [EntityKind; 3] = [EntityKind::Customer, EntityKind::Invoice, EntityKind::Item];

    pub fn remote_name(&self) -> &'static str {
        match self {
            EntityKind::Customer => "Customer",
            EntityKind::Invoice => "Invoice",
            EntityKind::Item => "Item",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customers",
            EntityKind::Invoice => "invoices",
            EntityKind::Item => "items",
        }
    }

    /// Invoices are dated by transaction date first; the rest by last update.
    pub fn date_fields(&self) -> Vec<DateField> {
        match self {
            EntityKind::Invoice => vec![DateField::TxnDate, DateField::LastUpdatedTime],
            EntityKind::Customer | EntityKind::Item => vec![DateField::LastUpdatedTime],
        }
    }

    pub fn destination(&self) -> TableRef {
        TableRef::trusted(RAW_SCHEMA, format!("qb_{}", self.label()))
    }

    pub fn spec(&self) -> EntitySpec {
        EntitySpec::new(
            self.remote_name(),
            self.label(),
            self.date_fields(),
            self.destination(),
        )
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "customer" | "customers" => Ok(EntityKind::Customer),
            "invoice" | "invoices" => Ok(EntityKind::Invoice),
            "item" | "items" => Ok(EntityKind::Item),
            other => Err(IngestError::config(format!(
                "Unknown entity '{other}'. Expected one of: customers, invoices, items"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_specs() {
        let invoice = EntityKind::Invoice.spec();
        assert_eq!(invoice.query, "SELECT * FROM Invoice");
        assert_eq!(invoice.destination.qualified(), "raw.qb_invoices");
        assert_eq!(invoice.date_fields, vec![DateField::TxnDate, DateField::LastUpdatedTime]);

        let item = EntityKind::Item.spec();
        assert_eq!(item.remote_name, "Item");
        assert_eq!(item.label, "items");
        assert_eq!(item.destination.qualified(), "raw.qb_items");
        assert_eq!(item.date_fields, vec![DateField::LastUpdatedTime]);

        assert_eq!(
            EntityKind::Customer.spec().destination.qualified(),
            "raw.qb_customers"
        );
    }

    #[test]
    fn test_parse_entity_kind() {
        assert_eq!("Invoices".parse::<EntityKind>().unwrap(), EntityKind::Invoice);
        assert_eq!("customer".parse::<EntityKind>().unwrap(), EntityKind::Customer);
        assert_eq!(" ITEM ".parse::<EntityKind>().unwrap(), EntityKind::Item);
        assert!("vendors".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_date_field_read() {
        let record = json!({
            "Id": "7",
            "TxnDate": "",
            "MetaData": { "LastUpdatedTime": "2025-03-15T10:00:00Z" }
        });

        assert_eq!(DateField::TxnDate.read(&record), None);
        assert_eq!(
            DateField::LastUpdatedTime.read(&record),
            Some("2025-03-15T10:00:00Z")
        );
    }
}
