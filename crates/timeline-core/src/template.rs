//! Compose template rendering.
//!
//! Placeholders use single braces (`{server_image}`); `{{` and `}}` produce
//! literal braces. `{server_additional_envs}` expands to one `KEY: "VALUE"`
//! line per entry, indented like the line the placeholder sits on.

use std::path::Path;

use crate::error::{Result, TimelineError};
use crate::variant::Variant;

pub fn load_template(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(TimelineError::TemplateNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(std::fs::read_to_string(path)?)
}

pub fn render_compose(template: &str, variant: &Variant) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 256);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(TimelineError::Template(format!(
                                "unterminated placeholder \"{{{name}\""
                            )))
                        }
                    }
                }
                let value = placeholder(name.trim(), variant, current_indent(&out))?;
                out.push_str(&value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(TimelineError::Template(
                    "single '}' encountered, use '}}' for a literal brace".to_string(),
                ))
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

fn placeholder(name: &str, variant: &Variant, indent: &str) -> Result<String> {
    match name {
        "server_image" => Ok(variant.server_image.clone()),
        "server_type" => Ok(variant.server_type.clone()),
        "server_version" => Ok(variant.server_version.clone()),
        "server_additional_envs" => Ok(render_envs(variant, indent)),
        other => Err(TimelineError::Template(format!(
            "unknown placeholder \"{other}\""
        ))),
    }
}

fn render_envs(variant: &Variant, indent: &str) -> String {
    variant
        .additional_envs
        .iter()
        .map(|(key, value)| format!("{key}: \"{}\"", escape(value)))
        .collect::<Vec<_>>()
        .join(&format!("\n{indent}"))
}

/// Leading whitespace of the line currently being written.
fn current_indent(out: &str) -> &str {
    let line = out.rsplit('\n').next().unwrap_or("");
    let end = line
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(line.len());
    &line[..end]
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
