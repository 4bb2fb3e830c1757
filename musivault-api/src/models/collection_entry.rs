//! User-owned physical copies of catalog records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::CatalogRecord;

/// Physical formats accepted by the importer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicalFormat {
    Vinyl,
    #[serde(rename = "CD")]
    Cd,
}

impl PhysicalFormat {
    /// Case-insensitive parse of a CSV format token
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vinyl" => Some(PhysicalFormat::Vinyl),
            "cd" => Some(PhysicalFormat::Cd),
            _ => None,
        }
    }

    /// Name as used by Discogs format filters and descriptors
    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicalFormat::Vinyl => "Vinyl",
            PhysicalFormat::Cd => "CD",
        }
    }
}

/// Goldmine grading scale for media and sleeve condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "M")]
    Mint,
    #[serde(rename = "NM")]
    NearMint,
    #[serde(rename = "VG+")]
    VeryGoodPlus,
    #[serde(rename = "VG")]
    VeryGood,
    #[serde(rename = "G+")]
    GoodPlus,
    #[serde(rename = "G")]
    Good,
    #[serde(rename = "F")]
    Fair,
    #[serde(rename = "P")]
    Poor,
}

impl Condition {
    /// Parse an abbreviation ("VG+") or a Discogs-style name
    /// ("Very Good Plus (VG+)", "Near Mint (NM or M-)")
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let grade = match (value.find('('), value.rfind(')')) {
            (Some(open), Some(close)) if open < close => &value[open + 1..close],
            _ => value,
        };

        match grade.trim().to_ascii_uppercase().as_str() {
            "M" | "MINT" => Some(Condition::Mint),
            "NM" | "M-" | "NM OR M-" | "NEAR MINT" => Some(Condition::NearMint),
            "VG+" | "VERY GOOD PLUS" => Some(Condition::VeryGoodPlus),
            "VG" | "VERY GOOD" => Some(Condition::VeryGood),
            "G+" | "GOOD PLUS" => Some(Condition::GoodPlus),
            "G" | "GOOD" => Some(Condition::Good),
            "F" | "FAIR" => Some(Condition::Fair),
            "P" | "POOR" => Some(Condition::Poor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Mint => "M",
            Condition::NearMint => "NM",
            Condition::VeryGoodPlus => "VG+",
            Condition::VeryGood => "VG",
            Condition::GoodPlus => "G+",
            Condition::Good => "G",
            Condition::Fair => "F",
            Condition::Poor => "P",
        }
    }
}

/// Chosen format of an owned copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDescriptor {
    pub name: String,
    /// Free text, e.g. "180g" or "Remastered"
    pub variant: Option<String>,
    /// e.g. ["LP", "Album"]
    pub descriptions: Vec<String>,
}

impl FormatDescriptor {
    pub fn bare(format: PhysicalFormat) -> Self {
        Self {
            name: format.as_str().to_string(),
            variant: None,
            descriptions: Vec::new(),
        }
    }
}

/// A collection entry waiting to be written alongside its import entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewCollectionEntry {
    pub catalog_record_id: Uuid,
    pub format: FormatDescriptor,
    pub media_condition: Option<Condition>,
    pub sleeve_condition: Option<Condition>,
}

/// One owned copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    pub id: Uuid,
    pub owner: Uuid,
    pub catalog_record_id: Uuid,
    pub format: FormatDescriptor,
    pub media_condition: Option<Condition>,
    pub sleeve_condition: Option<Condition>,
    pub added_at: DateTime<Utc>,
}

/// Collection entry joined with its catalog record, as listed to the owner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    #[serde(flatten)]
    pub entry: CollectionEntry,
    pub release: CatalogRecord,
}
