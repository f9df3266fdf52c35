//! Command handlers.

use crate::error::ServerError;
use crate::session::{Session, SessionState};
use flowd_core::{WorkflowDefinition, WorkflowEngine};
use flowd_protocol::message::*;
use flowd_protocol::{ErrorCode, PROTOCOL_VERSION};
use serde_json::{json, Value};
use std::sync::Arc;

/// Server capabilities and limits.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub max_line_bytes: usize,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "flowd".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_line_bytes: flowd_protocol::MAX_LINE_BYTES,
        }
    }
}

/// Command handler. This is the service facade boundary: it decodes
/// parameters, calls the engine, and shapes results and errors into
/// responses. It holds no workflow logic of its own.
pub struct CommandHandler {
    engine: Arc<WorkflowEngine>,
    info: ServerInfo,
}

impl CommandHandler {
    /// Creates a new command handler.
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            info: ServerInfo::default(),
        }
    }

    /// Creates a new command handler with custom server info.
    pub fn with_info(engine: Arc<WorkflowEngine>, info: ServerInfo) -> Self {
        Self { engine, info }
    }

    /// Returns whether an operation may run before the HELLO
    /// handshake.
    fn allowed_before_handshake(op: &Operation) -> bool {
        matches!(
            op,
            Operation::Hello | Operation::Ping | Operation::Info | Operation::Bye
        )
    }

    /// Handles a request and returns a response.
    pub fn handle(&self, session: &mut Session, request: &Request) -> Response {
        session.record_request();

        if !Self::allowed_before_handshake(&request.op) && !session.is_ready() {
            return Self::error_response(&request.id, &ServerError::HandshakeRequired);
        }

        let result = match request.op {
            Operation::Hello => self.handle_hello(session, &request.params),
            Operation::Ping => self.handle_ping(),
            Operation::Bye => self.handle_bye(session),
            Operation::Info => self.handle_info(),
            Operation::RegisterDefinition => self.handle_register_definition(&request.params),
            Operation::GetDefinition => self.handle_get_definition(&request.params),
            Operation::ListDefinitions => self.handle_list_definitions(),
            Operation::ListStates => self.handle_list_states(&request.params),
            Operation::ListActions => self.handle_list_actions(&request.params),
            Operation::CreateInstance => self.handle_create_instance(&request.params),
            Operation::GetInstance => self.handle_get_instance(&request.params),
            Operation::ListInstances => self.handle_list_instances(),
            Operation::ExecuteAction => self.handle_execute_action(&request.params),
        };

        match result {
            Ok(value) => Response::ok(&request.id, value).with_meta(ResponseMeta {
                server_time: Some(chrono::Utc::now()),
            }),
            Err(e) => Self::error_response(&request.id, &e),
        }
    }

    fn error_response(request_id: &str, error: &ServerError) -> Response {
        let code = error.error_code();
        if code.is_server_error() {
            tracing::error!(%error, "request failed with server fault");
        }

        let mut response_error = ResponseError::new(code, error.to_string());
        for (key, value) in error.details() {
            response_error = response_error.with_detail(key, value);
        }
        Response::error(request_id, response_error)
    }

    fn parse_params<T: serde::de::DeserializeOwned>(params: &Value) -> Result<T, ServerError> {
        serde_json::from_value(params.clone()).map_err(|e| ServerError::InvalidRequest(e.to_string()))
    }

    // =========================================================================
    // Session operations
    // =========================================================================

    fn handle_hello(&self, session: &mut Session, params: &Value) -> Result<Value, ServerError> {
        let p: HelloParams = Self::parse_params(params)?;

        if p.protocol_version != PROTOCOL_VERSION {
            return Err(ServerError::UnsupportedProtocol(p.protocol_version));
        }

        session.complete_handshake(p.protocol_version, p.client_name);
        tracing::debug!(
            session_id = %session.id,
            client_name = session.client_name().unwrap_or("-"),
            "handshake complete"
        );

        Ok(serde_json::to_value(HelloResult {
            protocol_version: PROTOCOL_VERSION,
            server_name: self.info.name.clone(),
            server_version: self.info.version.clone(),
        })?)
    }

    fn handle_ping(&self) -> Result<Value, ServerError> {
        Ok(json!({"pong": true}))
    }

    fn handle_bye(&self, session: &mut Session) -> Result<Value, ServerError> {
        session.set_state(SessionState::Closing);
        Ok(json!({"goodbye": true}))
    }

    fn handle_info(&self) -> Result<Value, ServerError> {
        Ok(json!({
            "server_name": self.info.name,
            "server_version": self.info.version,
            "protocol_version": PROTOCOL_VERSION,
            "max_line_bytes": self.info.max_line_bytes,
        }))
    }

    // =========================================================================
    // Definition operations
    // =========================================================================

    fn handle_register_definition(&self, params: &Value) -> Result<Value, ServerError> {
        let p: RegisterDefinitionParams = Self::parse_params(params)?;
        let definition: WorkflowDefinition = serde_json::from_value(p.definition)
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;

        let stored = self.engine.register_definition(definition)?;
        let checksum = stored.checksum().map_err(flowd_core::CoreError::Json)?;

        Ok(serde_json::to_value(RegisterDefinitionResult {
            definition: serde_json::to_value(stored.as_ref())?,
            checksum,
        })?)
    }

    fn handle_get_definition(&self, params: &Value) -> Result<Value, ServerError> {
        let p: DefinitionRefParams = Self::parse_params(params)?;

        let definition = self.engine.get_definition(&p.definition_id)?;
        let checksum = definition.checksum().map_err(flowd_core::CoreError::Json)?;

        Ok(serde_json::to_value(GetDefinitionResult {
            definition: serde_json::to_value(definition.as_ref())?,
            checksum,
        })?)
    }

    fn handle_list_definitions(&self) -> Result<Value, ServerError> {
        let items = self
            .engine
            .list_definitions()
            .iter()
            .map(|d| serde_json::to_value(d.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({"items": items}))
    }

    fn handle_list_states(&self, params: &Value) -> Result<Value, ServerError> {
        let p: DefinitionRefParams = Self::parse_params(params)?;
        let states = self.engine.definition_states(&p.definition_id)?;
        Ok(json!({
            "definition_id": p.definition_id,
            "states": states,
        }))
    }

    fn handle_list_actions(&self, params: &Value) -> Result<Value, ServerError> {
        let p: DefinitionRefParams = Self::parse_params(params)?;
        let actions = self.engine.definition_actions(&p.definition_id)?;
        Ok(json!({
            "definition_id": p.definition_id,
            "actions": actions,
        }))
    }

    // =========================================================================
    // Instance operations
    // =========================================================================

    fn handle_create_instance(&self, params: &Value) -> Result<Value, ServerError> {
        let p: CreateInstanceParams = Self::parse_params(params)?;
        let instance = self.engine.create_instance(&p.definition_id)?;
        Ok(json!({"instance": instance}))
    }

    fn handle_get_instance(&self, params: &Value) -> Result<Value, ServerError> {
        let p: InstanceRefParams = Self::parse_params(params)?;
        let instance = self.engine.get_instance(&p.instance_id)?;
        Ok(json!({"instance": instance}))
    }

    fn handle_list_instances(&self) -> Result<Value, ServerError> {
        Ok(json!({"items": self.engine.list_instances()}))
    }

    fn handle_execute_action(&self, params: &Value) -> Result<Value, ServerError> {
        let p: ExecuteActionParams = Self::parse_params(params)?;
        let instance = self.engine.execute_action(&p.instance_id, &p.action_id)?;
        Ok(json!({"instance": instance}))
    }
}
