use crate::error::Error;

use super::schema::MigrationPlan;

pub fn parse_yaml(yaml_str: &str) -> Result<MigrationPlan, Error> {
    let plan: MigrationPlan = serde_yaml::from_str(yaml_str).map_err(|e| {
        let err = if let Some(location) = e.location() {
            ParseError::InvalidYaml {
                line: location.line(),
                column: location.column(),
                message: e.to_string(),
            }
        } else {
            ParseError::InvalidYamlNoLocation {
                message: e.to_string(),
            }
        };
        Error::Config(err.to_string())
    })?;

    if plan.phases.is_empty() {
        return Err(Error::Config(
            "Migration plan contains no phases".to_string(),
        ));
    }

    Ok(plan)
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid migration plan at line {line}, column {column}: {message}")]
    InvalidYaml {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid migration plan: {message}")]
    InvalidYamlNoLocation { message: String },
}
