//! Tool execution for agent decisions
//!
//! Tools are synchronous and may block on file or process I/O; callers run
//! them on a blocking worker. Every tool reports success as a short,
//! human-readable detail line.

mod files;
mod system;

use serde_json::Value;
use tracing::debug;

/// Errors from tool execution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotRecognized(String),

    #[error("{0}")]
    Failed(String),
}

/// Executes a named tool with the agent-supplied parameter
pub trait ToolExecutor: Send + Sync {
    /// Run `tool`; returns a detail line on success
    fn execute(&self, tool: &str, parameter: &Value) -> Result<String, ToolError>;
}

/// Every tool name the agent may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Pure conversation, nothing to execute
    Chat,
    OpenApp,
    OpenFolder,
    OpenUrl,
    Google,
    RunCmd,
    FindFile,
    ListFiles,
    ReadFile,
    CreateFile,
    CreateFolder,
    DeleteFile,
    EditFile,
    CopyFile,
    MoveFile,
    OrganizeFiles,
    SystemInfo,
    KillProcess,
    Screenshot,
    EmptyRecycleBin,
    ChangeWallpaper,
}

impl Tool {
    /// Look up a tool by its wire name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        let tool = match name.trim().to_ascii_uppercase().as_str() {
            "CHAT" => Tool::Chat,
            "OPEN_APP" => Tool::OpenApp,
            "OPEN_FOLDER" => Tool::OpenFolder,
            "OPEN_URL" => Tool::OpenUrl,
            "GOOGLE" => Tool::Google,
            "RUN_CMD" => Tool::RunCmd,
            "FIND_FILE" => Tool::FindFile,
            "LIST_FILES" => Tool::ListFiles,
            "READ_FILE" => Tool::ReadFile,
            "CREATE_FILE" => Tool::CreateFile,
            "CREATE_FOLDER" => Tool::CreateFolder,
            "DELETE_FILE" => Tool::DeleteFile,
            "EDIT_FILE" => Tool::EditFile,
            "COPY_FILE" => Tool::CopyFile,
            "MOVE_FILE" => Tool::MoveFile,
            "ORGANIZE_FILES" => Tool::OrganizeFiles,
            "SYSTEM_INFO" => Tool::SystemInfo,
            "KILL_PROCESS" => Tool::KillProcess,
            "SCREENSHOT" => Tool::Screenshot,
            "EMPTY_RECYCLE_BIN" => Tool::EmptyRecycleBin,
            "CHANGE_WALLPAPER" => Tool::ChangeWallpaper,
            _ => return None,
        };
        Some(tool)
    }

    /// True for tools with no side effect to execute
    pub fn is_conversation(name: &str) -> bool {
        Self::parse(name) == Some(Tool::Chat)
    }
}

/// Tool executor acting on the local desktop
#[derive(Debug, Default)]
pub struct DesktopTools;

impl DesktopTools {
    pub fn new() -> Self {
        Self
    }
}

impl ToolExecutor for DesktopTools {
    fn execute(&self, tool: &str, parameter: &Value) -> Result<String, ToolError> {
        let parsed = Tool::parse(tool).ok_or_else(|| ToolError::NotRecognized(tool.to_string()))?;
        debug!(?parsed, %parameter, "executing tool");

        match parsed {
            Tool::Chat => Ok(String::new()),
            Tool::OpenApp => system::open_application(text_param(parameter)?),
            Tool::OpenFolder => system::open_folder(text_param(parameter)?),
            Tool::OpenUrl => system::open_url(text_param(parameter)?),
            Tool::Google => system::google_search(text_param(parameter)?),
            Tool::RunCmd => system::run_command(text_param(parameter)?),
            Tool::FindFile => files::find_file(text_param(parameter)?),
            Tool::ListFiles => files::list_files(optional_text(parameter).unwrap_or(".")),
            Tool::ReadFile => files::read_file(text_param(parameter)?),
            Tool::CreateFile => files::create_file(
                field(parameter, "path")?,
                optional_field(parameter, "content").unwrap_or_default(),
            ),
            Tool::CreateFolder => files::create_folder(text_param(parameter)?),
            Tool::DeleteFile => files::delete_path(text_param(parameter)?),
            Tool::EditFile => files::edit_file(
                field(parameter, "path")?,
                field(parameter, "content")?,
                optional_field(parameter, "mode").unwrap_or("append"),
            ),
            Tool::CopyFile => {
                files::copy_file(field(parameter, "source")?, field(parameter, "destination")?)
            }
            Tool::MoveFile => {
                files::move_file(field(parameter, "source")?, field(parameter, "destination")?)
            }
            Tool::OrganizeFiles => files::organize_files(text_param(parameter)?),
            Tool::SystemInfo => system::system_info(optional_text(parameter).unwrap_or("all")),
            Tool::KillProcess => system::kill_process(text_param(parameter)?),
            Tool::Screenshot => system::take_screenshot(optional_text(parameter)),
            Tool::EmptyRecycleBin => files::empty_recycle_bin(),
            Tool::ChangeWallpaper => system::change_wallpaper(optional_text(parameter)),
        }
    }
}

/// A required string parameter
fn text_param(parameter: &Value) -> Result<&str, ToolError> {
    optional_text(parameter).ok_or_else(|| ToolError::Failed("expected a text parameter".into()))
}

/// A string parameter; `null`, `""` and the literal `"null"` count as absent
fn optional_text(parameter: &Value) -> Option<&str> {
    parameter
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "null")
}

/// A required string field of an object parameter
fn field<'a>(parameter: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    optional_field(parameter, key)
        .ok_or_else(|| ToolError::Failed(format!("missing parameter field '{}'", key)))
}

fn optional_field<'a>(parameter: &'a Value, key: &str) -> Option<&'a str> {
    parameter.get(key).and_then(Value::as_str)
}
