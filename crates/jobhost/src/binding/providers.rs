// Built-in binding providers
//
// Each provider answers for one narrow shape of parameter and declines
// everything else; ordering across providers is the chain's concern.

use super::{ArgumentBinding, BindingProvider, BindingRequest, Conversion, Inbound, ResourceKind};
use crate::descriptor::{BindingAttribute, Direction, ParamType};

/// Payload shape a [`PayloadProvider`] accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
	Bytes,
	Text,
	Object,
}

impl Payload {
	fn accepts(self, param_type: &ParamType) -> bool {
		matches!(
			(self, param_type),
			(Payload::Bytes, ParamType::Bytes) | (Payload::Text, ParamType::Text) | (Payload::Object, ParamType::Object(_))
		)
	}

	fn conversion(self) -> Conversion {
		match self {
			Payload::Bytes => Conversion::Bytes,
			Payload::Text => Conversion::Text,
			Payload::Object => Conversion::Json,
		}
	}
}

/// Queue message or blob content, for one direction and one payload shape.
///
/// Output variants are write-only and follow the tri-state flush rule; input
/// variants are read-only.
#[derive(Debug, Clone)]
pub struct PayloadProvider {
	name: &'static str,
	direction: Direction,
	payload: Payload,
}

impl PayloadProvider {
	pub fn output_bytes() -> Self {
		Self {
			name: "out-bytes",
			direction: Direction::Out,
			payload: Payload::Bytes,
		}
	}

	pub fn output_text() -> Self {
		Self {
			name: "out-text",
			direction: Direction::Out,
			payload: Payload::Text,
		}
	}

	pub fn output_object() -> Self {
		Self {
			name: "out-object",
			direction: Direction::Out,
			payload: Payload::Object,
		}
	}

	pub fn input_bytes() -> Self {
		Self {
			name: "in-bytes",
			direction: Direction::In,
			payload: Payload::Bytes,
		}
	}

	pub fn input_text() -> Self {
		Self {
			name: "in-text",
			direction: Direction::In,
			payload: Payload::Text,
		}
	}

	pub fn input_object() -> Self {
		Self {
			name: "in-object",
			direction: Direction::In,
			payload: Payload::Object,
		}
	}
}

impl BindingProvider for PayloadProvider {
	fn name(&self) -> &'static str {
		self.name
	}

	fn try_create(&self, request: &BindingRequest<'_>) -> Option<ArgumentBinding> {
		let param = request.parameter;
		let kind = match param.binding.as_ref()? {
			BindingAttribute::Queue { .. } => ResourceKind::Queue,
			BindingAttribute::Blob { .. } => ResourceKind::Blob,
			_ => return None,
		};
		if param.direction != self.direction || !self.payload.accepts(&param.param_type) {
			return None;
		}

		let binding = ArgumentBinding::new(self.name, request, kind);
		Some(match self.direction {
			Direction::Out => binding.with_outbound(self.payload.conversion()),
			_ => binding.with_inbound(Inbound::Content(self.payload.conversion())),
		})
	}
}

/// Table records of a structured type, in any direction
#[derive(Debug, Clone, Copy, Default)]
pub struct TableEntityProvider;

impl BindingProvider for TableEntityProvider {
	fn name(&self) -> &'static str {
		"table-entity"
	}

	fn try_create(&self, request: &BindingRequest<'_>) -> Option<ArgumentBinding> {
		let param = request.parameter;
		if !matches!(param.binding, Some(BindingAttribute::Table { .. })) {
			return None;
		}
		if !matches!(param.param_type, ParamType::Object(_)) {
			return None;
		}

		let mut binding = ArgumentBinding::new(self.name(), request, ResourceKind::Table);
		if param.direction.is_input() {
			binding = binding.with_inbound(Inbound::Content(Conversion::Json));
		}
		if param.direction.is_output() {
			binding = binding.with_outbound(Conversion::Json);
		}
		Some(binding)
	}
}

/// Unattributed text inputs named by a template token elsewhere in the function
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteParameterProvider;

impl BindingProvider for RouteParameterProvider {
	fn name(&self) -> &'static str {
		"route"
	}

	fn try_create(&self, request: &BindingRequest<'_>) -> Option<ArgumentBinding> {
		let param = request.parameter;
		if param.binding.is_some() || param.direction != Direction::In || param.param_type != ParamType::Text {
			return None;
		}
		if !request.route_parameters.contains(&param.name) {
			return None;
		}
		Some(ArgumentBinding::new(self.name(), request, ResourceKind::Route).with_inbound(Inbound::Route))
	}
}

/// Host-supplied inputs; the host's reader serves them by type name
#[derive(Debug, Clone, Copy, Default)]
pub struct HostContextProvider;

impl BindingProvider for HostContextProvider {
	fn name(&self) -> &'static str {
		"host-context"
	}

	fn try_create(&self, request: &BindingRequest<'_>) -> Option<ArgumentBinding> {
		let param = request.parameter;
		if param.binding != Some(BindingAttribute::Host) || param.direction != Direction::In {
			return None;
		}
		Some(
			ArgumentBinding::new(self.name(), request, ResourceKind::Host)
				.with_inbound(Inbound::Content(Conversion::for_type(&param.param_type))),
		)
	}
}
