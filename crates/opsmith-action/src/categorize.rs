//! Transaction categorization.
//!
//! Provides the categorizer seam and a keyword-based default that maps
//! movement descriptions to spending categories with a confidence score.

use opsmith_core::types::FlowType;
use regex::Regex;

/// A suggested category for a movement description.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub category: String,
    pub confidence: f64,
}

/// Maps free-text movement descriptions to categories.
///
/// Implementations must be deterministic: the preview and the later
/// execute run see the same suggestions for the same rows.
pub trait Categorizer: Send + Sync {
    fn suggest(&self, description: &str, flow_type: FlowType) -> Option<Suggestion>;
}

/// A single compiled keyword rule.
struct CategoryRule {
    regex: Regex,
    category: &'static str,
    confidence: f64,
    /// When set, the rule only applies to movements of this flow.
    flow: Option<FlowType>,
}

/// Keyword categorizer backed by a fixed rule table.
///
/// Rules are checked in order and the first match wins, so more specific
/// rules must come before broader ones.
pub struct KeywordCategorizer {
    rules: Vec<CategoryRule>,
}

impl Default for KeywordCategorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordCategorizer {
    /// Create a categorizer with the built-in rule table.
    pub fn new() -> Self {
        let table: Vec<(&str, &'static str, f64, Option<FlowType>)> = vec![
            (
                r"(?i)\b(payroll|salary|salaries|wages|gusto|adp)\b",
                "payroll",
                0.9,
                Some(FlowType::Expense),
            ),
            (
                r"(?i)\b(rent|lease|landlord)\b",
                "rent",
                0.9,
                Some(FlowType::Expense),
            ),
            (
                r"(?i)\b(insurance|premium)\b",
                "insurance",
                0.8,
                Some(FlowType::Expense),
            ),
            (
                r"(?i)\b(aws|amazon web services|github|slack|zoom|dropbox|adobe|saas|subscription|software|license)\b",
                "software",
                0.8,
                Some(FlowType::Expense),
            ),
            (
                r"(?i)\b(electricity|electric|water|internet|phone|broadband|utility|utilities)\b",
                "utilities",
                0.7,
                Some(FlowType::Expense),
            ),
            (
                r"(?i)\b(flight|airline|hotel|airbnb|uber|lyft|taxi|train|mileage|travel)\b",
                "travel",
                0.7,
                Some(FlowType::Expense),
            ),
            (
                r"(?i)\b(ads?|advertising|marketing|campaign|sponsorship)\b",
                "marketing",
                0.7,
                Some(FlowType::Expense),
            ),
            (
                r"(?i)\b(restaurant|cafe|coffee|lunch|dinner|catering|doordash|deliveroo)\b",
                "meals",
                0.6,
                Some(FlowType::Expense),
            ),
            (
                r"(?i)\b(tax|taxes|irs|hmrc|vat|filing fee)\b",
                "taxes_fees",
                0.6,
                Some(FlowType::Expense),
            ),
            (
                r"(?i)\b(office|supplies|stationery|staples|printer)\b",
                "office",
                0.5,
                Some(FlowType::Expense),
            ),
            (
                r"(?i)\b(invoice|payment received|stripe|paypal|sale|client)\b",
                "sales",
                0.7,
                Some(FlowType::Income),
            ),
            (
                r"(?i)\b(interest|dividend)\b",
                "interest",
                0.8,
                Some(FlowType::Income),
            ),
            // Weak catch-all, below the default apply threshold.
            (r"(?i)\b(misc|miscellaneous|general)\b", "general", 0.3, None),
        ];

        let rules = table
            .into_iter()
            .map(|(pattern, category, confidence, flow)| CategoryRule {
                regex: Regex::new(pattern).expect("Invalid category regex"),
                category,
                confidence,
                flow,
            })
            .collect();

        Self { rules }
    }
}

impl Categorizer for KeywordCategorizer {
    fn suggest(&self, description: &str, flow_type: FlowType) -> Option<Suggestion> {
        for rule in &self.rules {
            if let Some(required) = rule.flow {
                if required != flow_type {
                    continue;
                }
            }
            if rule.regex.is_match(description) {
                return Some(Suggestion {
                    category: rule.category.to_string(),
                    confidence: rule.confidence,
                });
            }
        }
        None
    }
}
