use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Structured result of analyzing one inspection report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InspectionAnalysis {
    pub property: PropertyInfo,
    pub inspector: InspectorInfo,
    pub summary: Summary,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyInfo {
    pub address: String,
    pub inspection_date: String,
    pub property_type: String,
    pub year_built: Option<i32>,
    pub square_footage: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InspectorInfo {
    pub name: String,
    pub company: String,
    pub license_number: String,
}

/// Narrative summaries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub overall_condition: String,
    pub major_concerns: String,
    pub maintenance_outlook: String,
}

/// One inspection issue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub item: String,
    pub issue: String,
    pub recommendation: String,
    pub category: Category,
    /// 1 (cosmetic) to 5 (safety critical, fix immediately)
    pub urgency: i32,
    /// Repair cost estimate in whole US dollars
    pub estimate: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Structural,
    Roof,
    Electrical,
    Plumbing,
    Hvac,
    Exterior,
    Interior,
    Appliances,
    Safety,
    Pest,
    Other,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Structural,
        Category::Roof,
        Category::Electrical,
        Category::Plumbing,
        Category::Hvac,
        Category::Exterior,
        Category::Interior,
        Category::Appliances,
        Category::Safety,
        Category::Pest,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Structural => "structural",
            Category::Roof => "roof",
            Category::Electrical => "electrical",
            Category::Plumbing => "plumbing",
            Category::Hvac => "hvac",
            Category::Exterior => "exterior",
            Category::Interior => "interior",
            Category::Appliances => "appliances",
            Category::Safety => "safety",
            Category::Pest => "pest",
            Category::Other => "other",
        }
    }
}

pub const MIN_URGENCY: i32 = 1;
pub const MAX_URGENCY: i32 = 5;

/// Largest repair estimate accepted from the model, in US dollars
pub const MAX_ESTIMATE: i64 = 10_000_000;

impl InspectionAnalysis {
    /// Parse model output, rejecting values the schema cannot express
    /// but the model may still produce (urgency out of range, cost outside
    /// `0..=MAX_ESTIMATE`).
    pub fn parse(raw: &str) -> Result<Self, String> {
        let analysis: InspectionAnalysis =
            serde_json::from_str(raw).map_err(|e| format!("Analysis does not match schema: {}", e))?;

        for finding in &analysis.findings {
            if !(MIN_URGENCY..=MAX_URGENCY).contains(&finding.urgency) {
                return Err(format!(
                    "Finding '{}' has urgency {} outside {}..={}",
                    finding.item, finding.urgency, MIN_URGENCY, MAX_URGENCY
                ));
            }
            if finding.estimate < 0 {
                return Err(format!(
                    "Finding '{}' has a negative estimate",
                    finding.item
                ));
            }
            if finding.estimate > MAX_ESTIMATE {
                return Err(format!(
                    "Finding '{}' has estimate {} above {}",
                    finding.item, finding.estimate, MAX_ESTIMATE
                ));
            }
        }

        Ok(analysis)
    }
}

/// JSON schema sent as the strict `response_format` for analysis requests
pub fn response_schema() -> Value {
    let categories: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();

    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["property", "inspector", "summary", "findings"],
        "properties": {
            "property": {
                "type": "object",
                "additionalProperties": false,
                "required": ["address", "inspection_date", "property_type", "year_built", "square_footage"],
                "properties": {
                    "address": { "type": "string" },
                    "inspection_date": { "type": "string" },
                    "property_type": { "type": "string" },
                    "year_built": { "type": ["integer", "null"] },
                    "square_footage": { "type": ["integer", "null"] }
                }
            },
            "inspector": {
                "type": "object",
                "additionalProperties": false,
                "required": ["name", "company", "license_number"],
                "properties": {
                    "name": { "type": "string" },
                    "company": { "type": "string" },
                    "license_number": { "type": "string" }
                }
            },
            "summary": {
                "type": "object",
                "additionalProperties": false,
                "required": ["overall_condition", "major_concerns", "maintenance_outlook"],
                "properties": {
                    "overall_condition": { "type": "string" },
                    "major_concerns": { "type": "string" },
                    "maintenance_outlook": { "type": "string" }
                }
            },
            "findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["item", "issue", "recommendation", "category", "urgency", "estimate"],
                    "properties": {
                        "item": { "type": "string" },
                        "issue": { "type": "string" },
                        "recommendation": { "type": "string" },
                        "category": { "type": "string", "enum": categories },
                        "urgency": {
                            "type": "integer",
                            "description": "1 = cosmetic, 5 = safety critical"
                        },
                        "estimate": {
                            "type": "integer",
                            "description": "Repair cost estimate in US dollars"
                        }
                    }
                }
            }
        }
    })
}
