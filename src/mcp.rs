//! MCP (Model Context Protocol) server for dbgtap.
//!
//! Exposes the capture manager's operations as MCP tools over stdio so AI
//! assistants can watch and filter live debug output. The manager is fully
//! synchronized internally, so the tool handlers call it directly.

use crate::filter::FilterSpec;
use crate::manager::CaptureManager;
use anyhow::Result;
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    schemars, tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;

// -- Tool parameter types --

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CreateSessionParams {
    /// Human-readable session name. Defaults to a sequential "session-<n>".
    name: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DestroySessionParams {
    /// Id returned by create_session.
    session_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetFiltersParams {
    /// Id returned by create_session.
    session_id: String,

    /// Regex patterns; an event matches if any include pattern matches its
    /// text. Empty means no include constraint.
    include: Option<Vec<String>>,

    /// Regex patterns; any match on the event text rejects the event,
    /// overriding every other dimension.
    exclude: Option<Vec<String>>,

    /// Only show events from these process ids.
    process_pids: Option<Vec<u32>>,

    /// Regex patterns matched against the resolved process name. Events
    /// whose pid could not be resolved never match a name filter.
    process_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GetOutputParams {
    /// Id returned by create_session.
    session_id: String,

    /// Max events to examine in this call. Default: 100. Filtered-out
    /// events count against the limit and are consumed; poll again for more.
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ClearSessionParams {
    /// Id returned by create_session.
    session_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GetSessionStatusParams {
    /// Id returned by create_session.
    session_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListProcessesParams {
    /// Case-insensitive substring filter on the process name.
    name_filter: Option<String>,
}

// -- Helper functions --

fn make_tool_result(value: serde_json::Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )])
}

/// Failure responses carry a single structured error field; success
/// responses never include one.
fn make_error_result(msg: &str) -> CallToolResult {
    let body = serde_json::json!({ "error": msg });
    let mut result = CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&body).unwrap_or_default(),
    )]);
    result.is_error = Some(true);
    result
}

// -- MCP Server --

#[derive(Clone)]
struct DbgtapMcpServer {
    manager: Arc<CaptureManager>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl DbgtapMcpServer {
    fn new(manager: Arc<CaptureManager>) -> Self {
        Self {
            manager,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "create_session",
        description = "Create a capture session. Starts the capture subprocess if it is not already running. The session only sees debug output emitted after its creation. Returns the session id and whether capture is running."
    )]
    async fn create_session(
        &self,
        Parameters(params): Parameters<CreateSessionParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        match self.manager.create_session(params.name) {
            Ok((session_id, capture_running)) => Ok(make_tool_result(serde_json::json!({
                "session_id": session_id,
                "capture_running": capture_running,
            }))),
            Err(e) => Ok(make_error_result(&format!("{e:#}"))),
        }
    }

    #[tool(
        name = "destroy_session",
        description = "Destroy a capture session. Other sessions are unaffected, and the capture subprocess keeps running even if this was the last session."
    )]
    async fn destroy_session(
        &self,
        Parameters(params): Parameters<DestroySessionParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        if self.manager.destroy_session(&params.session_id) {
            Ok(make_tool_result(serde_json::json!({ "success": true })))
        } else {
            Ok(make_error_result("Session not found"))
        }
    }

    #[tool(
        name = "set_filters",
        description = "Replace a session's filters. All patterns are validated before anything is applied: if any pattern is invalid the call fails and the session's existing filters are kept. Exclude patterns override include patterns. Omitted dimensions impose no constraint."
    )]
    async fn set_filters(
        &self,
        Parameters(params): Parameters<SetFiltersParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let spec = FilterSpec {
            include: params.include.unwrap_or_default(),
            exclude: params.exclude.unwrap_or_default(),
            process_pids: params.process_pids.unwrap_or_default(),
            process_names: params.process_names.unwrap_or_default(),
        };
        match self.manager.set_filters(&params.session_id, spec) {
            Ok(true) => Ok(make_tool_result(serde_json::json!({ "success": true }))),
            Ok(false) => Ok(make_error_result("Session not found")),
            Err(e) => Ok(make_error_result(&format!("{e:#}"))),
        }
    }

    #[tool(
        name = "get_output",
        description = "Read the next batch of captured debug events matching the session's filters, oldest first. Advances the session's cursor past every event examined, so each event is delivered at most once. Returns the events and the new cursor value."
    )]
    async fn get_output(
        &self,
        Parameters(params): Parameters<GetOutputParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        match self.manager.get_output(&params.session_id, params.limit) {
            Some((events, next_cursor)) => {
                let events: Vec<_> = events.iter().map(|e| e.as_ref()).collect();
                Ok(make_tool_result(serde_json::json!({
                    "events": events,
                    "count": events.len(),
                    "next_cursor": next_cursor,
                })))
            }
            None => Ok(make_error_result("Session not found")),
        }
    }

    #[tool(
        name = "clear_session",
        description = "Discard a session's pending backlog by moving its cursor to the newest captured event. The next get_output only returns events captured after this call."
    )]
    async fn clear_session(
        &self,
        Parameters(params): Parameters<ClearSessionParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        if self.manager.clear_session(&params.session_id) {
            Ok(make_tool_result(serde_json::json!({ "success": true })))
        } else {
            Ok(make_error_result("Session not found"))
        }
    }

    #[tool(
        name = "get_session_status",
        description = "Get a session's status: name, active filters, cursor, pending (pre-filter) event count, capture-subprocess state, and total buffered events."
    )]
    async fn get_session_status(
        &self,
        Parameters(params): Parameters<GetSessionStatusParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        match self.manager.get_session_status(&params.session_id) {
            Some(status) => Ok(make_tool_result(
                serde_json::to_value(status).unwrap_or_default(),
            )),
            None => Ok(make_error_result("Session not found")),
        }
    }

    #[tool(
        name = "list_processes",
        description = "List running processes ({pid, name}), optionally filtered by a case-insensitive substring of the process name. Useful for building process filters."
    )]
    async fn list_processes(
        &self,
        Parameters(params): Parameters<ListProcessesParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let processes = self.manager.list_processes(params.name_filter.as_deref());
        Ok(make_tool_result(serde_json::json!({
            "count": processes.len(),
            "processes": processes,
        })))
    }

    #[tool(
        name = "list_sessions",
        description = "List every capture session (id, name, cursor) and whether the capture subprocess is running."
    )]
    async fn list_sessions(&self) -> std::result::Result<CallToolResult, McpError> {
        let (sessions, capture_running) = self.manager.list_sessions();
        Ok(make_tool_result(serde_json::json!({
            "sessions": sessions,
            "capture_running": capture_running,
        })))
    }
}

const SERVER_INSTRUCTIONS: &str = "\
dbgtap MCP server: capture and filter live OS debug output.

# What this captures
A native capture subprocess intercepts debug strings emitted by running
processes (OutputDebugString-style output) and streams them here. Events are
held in a bounded in-memory log; each session reads the log independently
through its own cursor and filters.

# Important conventions
- Sessions only see events captured after create_session.
- get_output never delivers the same event twice: the cursor advances past
  every event it examines, including filtered-out ones.
- The log is a bounded best-effort tail. A session that polls too slowly
  loses the unread backlog once the log wraps; this is silent and expected.
- Exclude filters always win over include filters.
- Filters are regexes, matched case-insensitively.

# Recommended workflow
1. create_session - start capturing (one session per concern).
2. list_processes - find pids/names to filter on, if needed.
3. set_filters - narrow the stream (include/exclude/pids/names).
4. get_output - poll for new events; repeat as needed.
5. clear_session - skip accumulated backlog before a fresh experiment.
6. get_session_status - check pending backlog and capture health.
7. destroy_session - when done.";

#[tool_handler]
impl ServerHandler for DbgtapMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Run the MCP server over stdio transport. Returns when the client
/// disconnects; capture is stopped on the way out.
pub async fn run_mcp_server(manager: Arc<CaptureManager>) -> Result<()> {
    let server = DbgtapMcpServer::new(manager.clone());

    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    manager.stop_capture();
    Ok(())
}
