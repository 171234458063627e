use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Closed set of expense categories. Unknown names decode to `Other`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Food,
    Transport,
    Entertainment,
    Health,
    Education,
    Housing,
    Services,
    Clothing,
    Technology,
    #[default]
    Other,
}

impl Category {
    const ALL: [Category; 10] = [
        Category::Food,
        Category::Transport,
        Category::Entertainment,
        Category::Health,
        Category::Education,
        Category::Housing,
        Category::Services,
        Category::Clothing,
        Category::Technology,
        Category::Other,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    /// Stable machine name, as persisted.
    pub fn name(self) -> &'static str {
        match self {
            Category::Food => "FOOD",
            Category::Transport => "TRANSPORT",
            Category::Entertainment => "ENTERTAINMENT",
            Category::Health => "HEALTH",
            Category::Education => "EDUCATION",
            Category::Housing => "HOUSING",
            Category::Services => "SERVICES",
            Category::Clothing => "CLOTHING",
            Category::Technology => "TECHNOLOGY",
            Category::Other => "OTHER",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Transport => "Transport",
            Category::Entertainment => "Entertainment",
            Category::Health => "Health",
            Category::Education => "Education",
            Category::Housing => "Housing",
            Category::Services => "Services",
            Category::Clothing => "Clothing",
            Category::Technology => "Technology",
            Category::Other => "Other",
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Category::Food => "🍔",
            Category::Transport => "🚗",
            Category::Entertainment => "🎬",
            Category::Health => "🏥",
            Category::Education => "📚",
            Category::Housing => "🏠",
            Category::Services => "💡",
            Category::Clothing => "👕",
            Category::Technology => "💻",
            Category::Other => "📦",
        }
    }

    /// Case-insensitive lookup; anything unrecognised is `Other`.
    pub fn from_name(value: &str) -> Category {
        let wanted = value.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .unwrap_or(Category::Other)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // lossy: a non-string or unknown value is Other, never an error
        let raw = Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(Category::from_name).unwrap_or_default())
    }
}

/// A single expense as seen by the app.
#[derive(Debug, Clone, PartialEq)]
pub struct Expense {
    pub id: String,       // empty until persisted
    pub owner_id: String, // stamped by the gateway on every write
    pub name: String,
    pub amount: f64,
    pub category: Category,
    pub date: OffsetDateTime,
    pub notes: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Expense {
    /// A not-yet-persisted expense. Owner and audit fields are set by the gateway.
    pub fn draft(
        name: impl Into<String>,
        amount: f64,
        category: Category,
        date: OffsetDateTime,
        notes: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: String::new(),
            owner_id: String::new(),
            name: name.into(),
            amount,
            category,
            date,
            notes: notes.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_document(&self) -> Map<String, Value> {
        let doc = ExpenseDocument {
            user_id: self.owner_id.clone(),
            name: self.name.clone(),
            amount: self.amount,
            category: self.category,
            date: self.date,
            notes: self.notes.clone(),
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        };
        match serde_json::to_value(doc) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Parses a stored document. A missing or mistyped name, amount or date
    /// fails; an unknown category, missing notes or audit timestamps do not.
    pub fn from_document(id: &str, doc: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let parsed: ExpenseDocument = serde_json::from_value(Value::Object(doc.clone()))?;
        Ok(Self {
            id: id.to_string(),
            owner_id: parsed.user_id,
            name: parsed.name,
            amount: parsed.amount,
            category: parsed.category,
            date: parsed.date,
            notes: parsed.notes,
            created_at: parsed.created_at.unwrap_or(parsed.date),
            updated_at: parsed.updated_at.or(parsed.created_at).unwrap_or(parsed.date),
        })
    }
}

/// Stored shape of an expense document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseDocument {
    #[serde(default)]
    user_id: String,
    name: String,
    amount: f64,
    #[serde(default)]
    category: Category,
    #[serde(with = "time::serde::rfc3339")]
    date: OffsetDateTime,
    #[serde(default)]
    notes: String,
    // audit fields, absent on records written before they existed
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
}
