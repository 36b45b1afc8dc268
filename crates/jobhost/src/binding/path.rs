// Resource-name templates
//
// Templates such as `invoices/{customer}/{id}.json` name a resource in terms
// of other parameters of the same function. Tokens are `{name}` with name made
// of ASCII alphanumerics and underscores.

use std::fmt;

use super::{BindingError, RouteValues};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
	Literal(String),
	Token(String),
}

/// Parsed resource-name template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
	template: String,
	segments: Vec<Segment>,
}

impl ResourcePath {
	pub fn parse(template: &str) -> Result<Self, BindingError> {
		let invalid = |reason: &str| BindingError::invalid_template(template, reason);

		if template.is_empty() {
			return Err(invalid("template is empty"));
		}

		let mut segments = Vec::new();
		let mut literal = String::new();
		let mut chars = template.chars();
		while let Some(c) = chars.next() {
			match c {
				'{' => {
					let mut token = String::new();
					let mut closed = false;
					for t in chars.by_ref() {
						match t {
							'}' => {
								closed = true;
								break;
							},
							'{' => return Err(invalid("nested '{'")),
							_ => token.push(t),
						}
					}
					if !closed {
						return Err(invalid("unclosed '{'"));
					}
					if token.is_empty() {
						return Err(invalid("empty token"));
					}
					if !token.chars().all(|t| t.is_ascii_alphanumeric() || t == '_') {
						return Err(invalid(&format!("invalid token name '{}'", token)));
					}
					if !literal.is_empty() {
						segments.push(Segment::Literal(std::mem::take(&mut literal)));
					}
					segments.push(Segment::Token(token));
				},
				'}' => return Err(invalid("unmatched '}'")),
				_ => literal.push(c),
			}
		}
		if !literal.is_empty() {
			segments.push(Segment::Literal(literal));
		}

		Ok(Self {
			template: template.to_string(),
			segments,
		})
	}

	pub fn as_str(&self) -> &str {
		&self.template
	}

	/// Names referenced by `{token}` segments, in order of appearance
	pub fn tokens(&self) -> impl Iterator<Item = &str> {
		self.segments.iter().filter_map(|s| match s {
			Segment::Token(t) => Some(t.as_str()),
			Segment::Literal(_) => None,
		})
	}

	pub fn is_literal(&self) -> bool {
		self.tokens().next().is_none()
	}

	/// Substitute route values into the template
	pub fn resolve(&self, route: &RouteValues) -> Result<String, BindingError> {
		let mut out = String::with_capacity(self.template.len());
		for segment in &self.segments {
			match segment {
				Segment::Literal(l) => out.push_str(l),
				Segment::Token(t) => {
					let value = route.get(t).ok_or_else(|| BindingError::MissingRouteValue {
						template: self.template.clone(),
						name: t.clone(),
					})?;
					out.push_str(value);
				},
			}
		}
		Ok(out)
	}
}

impl fmt::Display for ResourcePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.template)
	}
}
