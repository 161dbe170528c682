//! Instruction rendering using minijinja templates.
//!
//! Stage instructions are configuration strings such as
//! `"what are the main objects described in this: {{ question }}"`.
//! They are rendered against a flat string context. Undefined variables are
//! an error.

use std::collections::BTreeMap;

use minijinja::{Environment, UndefinedBehavior};

use crate::error::PortError;

/// Render `template` against `context`.
///
/// `name` identifies the template in error messages.
pub fn render_template(
  name: &str,
  template: &str,
  context: &BTreeMap<String, String>,
) -> Result<String, PortError> {
  let mut env = Environment::new();
  env.set_undefined_behavior(UndefinedBehavior::Strict);

  env
    .render_str(template, context)
    .map_err(|e| PortError::Template {
      name: name.to_string(),
      message: e.to_string(),
    })
}
