//! Column schema shared by the staging and target tables.
//!
//! A [`Schema`] names the staging table, the target table, and the ordered
//! column list. Both tables carry the same columns in the same order: staging
//! stores every column as text, the target stores each column as its declared
//! [`ColumnType`]. The built-in [`Schema::sales`] layout describes the retail
//! sales export; any other layout can be supplied as YAML.

use std::{collections::HashSet, fmt, fs::File, io::BufReader, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow, bail, ensure};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{error::ImportError, sales::columns};

pub const DEFAULT_STAGING_TABLE: &str = "retail_sales_staging";
pub const DEFAULT_TARGET_TABLE: &str = "retail_sales";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Date,
    Time,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["text", "integer", "float", "date", "time"]
    }

    /// Declared SQL type used for the target table.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "REAL",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "text" | "string" | "varchar" => Ok(ColumnType::Text),
            "integer" | "int" | "bigint" => Ok(ColumnType::Integer),
            "float" | "double" | "real" => Ok(ColumnType::Float),
            "date" => Ok(ColumnType::Date),
            "time" => Ok(ColumnType::Time),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            )),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ColumnType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub datatype: ColumnType,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub key: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ColumnMeta {
    pub fn new(name: &str, datatype: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            required: false,
            key: false,
        }
    }

    pub fn key(name: &str, datatype: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            required: true,
            key: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    #[serde(default = "Schema::default_staging_table")]
    pub staging_table: String,
    #[serde(default = "Schema::default_target_table")]
    pub target_table: String,
    pub columns: Vec<ColumnMeta>,
}

impl Default for Schema {
    fn default() -> Self {
        Schema::sales()
    }
}

impl Schema {
    /// The eleven-column retail sales layout.
    pub fn sales() -> Self {
        let columns = vec![
            ColumnMeta::key(columns::TRANSACTION_ID, ColumnType::Text),
            ColumnMeta::new(columns::SALE_DATE, ColumnType::Date),
            ColumnMeta::new(columns::SALE_TIME, ColumnType::Time),
            ColumnMeta::new(columns::CUSTOMER_ID, ColumnType::Integer),
            ColumnMeta::new(columns::GENDER, ColumnType::Text),
            ColumnMeta::new(columns::AGE, ColumnType::Integer),
            ColumnMeta::new(columns::CATEGORY, ColumnType::Text),
            ColumnMeta::new(columns::QUANTITY, ColumnType::Integer),
            ColumnMeta::new(columns::PRICE_PER_UNIT, ColumnType::Float),
            ColumnMeta::new(columns::COST_OF_GOODS_SOLD, ColumnType::Float),
            ColumnMeta::new(columns::TOTAL_SALE, ColumnType::Float),
        ];
        Schema {
            staging_table: Self::default_staging_table(),
            target_table: Self::default_target_table(),
            columns,
        }
    }

    pub fn default_staging_table() -> String {
        DEFAULT_STAGING_TABLE.to_string()
    }

    pub fn default_target_table() -> String {
        DEFAULT_TARGET_TABLE.to_string()
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn is_sales_layout(&self) -> bool {
        let sales = Schema::sales();
        self.columns == sales.columns
    }

    pub fn validate_headers(&self, headers: &[String]) -> Result<(), ImportError> {
        if headers.len() != self.columns.len() {
            let missing = self
                .columns
                .iter()
                .filter(|column| !headers.iter().any(|h| h == &column.name))
                .map(|column| column.name.as_str())
                .collect::<Vec<_>>();
            let detail = if missing.is_empty() {
                String::new()
            } else {
                format!(" (missing: {})", missing.join(", "))
            };
            return Err(ImportError::schema_mismatch(format!(
                "header length mismatch: schema expects {} column(s) but file contains {}{detail}",
                self.columns.len(),
                headers.len()
            )));
        }
        for (idx, column) in self.columns.iter().enumerate() {
            let name = headers.get(idx).map(|s| s.as_str()).unwrap_or_default();
            if name != column.name {
                return Err(ImportError::schema_mismatch(format!(
                    "header mismatch at position {}: expected '{}' but found '{}'",
                    idx + 1,
                    column.name,
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn ensure_valid(&self) -> Result<()> {
        ensure!(!self.columns.is_empty(), "Schema must declare at least one column");
        ensure_identifier(&self.staging_table)
            .with_context(|| format!("Staging table name '{}'", self.staging_table))?;
        ensure_identifier(&self.target_table)
            .with_context(|| format!("Target table name '{}'", self.target_table))?;
        ensure!(
            !self.staging_table.eq_ignore_ascii_case(&self.target_table),
            "Staging and target tables must differ (both are '{}')",
            self.target_table
        );
        let mut seen = HashSet::new();
        for column in &self.columns {
            ensure_identifier(&column.name)
                .with_context(|| format!("Column name '{}'", column.name))?;
            if !seen.insert(column.name.to_ascii_lowercase()) {
                bail!("Duplicate column '{}' in schema", column.name);
            }
            ensure!(
                !column.key || column.required,
                "Key column '{}' must also be required",
                column.name
            );
        }
        Ok(())
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        self.ensure_valid()?;
        serde_yaml::to_string(self).context("Serializing schema to YAML string")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.ensure_valid()?;
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing schema YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: Schema = serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        schema
            .ensure_valid()
            .with_context(|| format!("Validating schema {path:?}"))?;
        Ok(schema)
    }

    /// Loads `path` when given, otherwise the built-in sales layout.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Schema::load(path),
            None => Ok(Schema::sales()),
        }
    }
}

fn ensure_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = chars
        .next()
        .ok_or_else(|| anyhow!("Identifier cannot be empty"))?;
    ensure!(
        first.is_ascii_alphabetic() || first == '_',
        "Identifier must start with a letter or underscore"
    );
    ensure!(
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        "Identifier may only contain letters, digits, and underscores"
    );
    Ok(())
}
