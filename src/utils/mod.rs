use std::ffi::OsStr;
use std::sync::LazyLock;

use regex::Regex;

/// Name used when a title sanitizes down to nothing.
pub const FALLBACK_FILENAME: &str = "download";

static RESERVED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("reserved character pattern is valid"));

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned = RESERVED_CHARS.replace_all(filename, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Whether `program` can be found on the executable search path.
pub fn is_tool_available(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Build a child process that does not flash a console window on Windows.
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd.kill_on_drop(true);
    cmd
}
