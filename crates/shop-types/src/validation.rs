//! Validation of implementation-specific TOML sections.
//!
//! Backends such as `[storage.implementations.file]` carry free-form TOML.
//! Each backend describes the keys it understands with a [`Schema`] and checks
//! its section before it is constructed.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// Error that occurs when a required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// Error that occurs when a field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// Error that occurs when field type is incorrect.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	/// Error that occurs when a key is not part of the schema.
	#[error("Unknown field: {0}")]
	UnknownField(String),
}

/// Represents the type of a configuration field.
#[derive(Debug, Clone)]
pub enum FieldType {
	String,
	/// An integer with optional inclusive bounds.
	Integer {
		min: Option<i64>,
		max: Option<i64>,
	},
}

impl FieldType {
	fn check(&self, field: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let mismatch = |expected: &str| ValidationError::TypeMismatch {
			field: field.to_string(),
			expected: expected.to_string(),
			actual: value.type_str().to_string(),
		};

		match self {
			FieldType::String => value.as_str().map(|_| ()).ok_or_else(|| mismatch("string")),
			FieldType::Integer { min, max } => {
				let int_val = value.as_integer().ok_or_else(|| mismatch("integer"))?;
				if min.is_some_and(|min| int_val < min) || max.is_some_and(|max| int_val > max) {
					return Err(ValidationError::InvalidValue {
						field: field.to_string(),
						message: format!(
							"Value {} is outside the allowed range {:?}..={:?}",
							int_val, min, max
						),
					});
				}
				Ok(())
			},
		}
	}
}

/// A named field of a schema.
#[derive(Debug, Clone)]
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
		}
	}
}

/// Required and optional fields of one TOML table.
///
/// Keys not listed in either set are rejected so typos surface at startup.
#[derive(Debug, Clone, Default)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.field_type.check(&field.name, value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.field_type.check(&field.name, value)?;
			}
		}

		let known = |key: &str| {
			self.required
				.iter()
				.chain(self.optional.iter())
				.any(|f| f.name == key)
		};
		if let Some(unknown) = table.keys().find(|key| !known(key)) {
			return Err(ValidationError::UnknownField(unknown.clone()));
		}

		Ok(())
	}
}

/// Trait implemented by every pluggable backend to check its own section.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
