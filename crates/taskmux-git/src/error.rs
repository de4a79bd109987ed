use std::path::PathBuf;
use std::string::FromUtf8Error;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git failed to start ({command}): {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("git exited non-zero ({command}) status={status:?}: {stderr}")]
    Failed {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("git output was not valid UTF-8 ({command}, {stream}): {source}")]
    NonUtf8 {
        command: String,
        stream: &'static str,
        #[source]
        source: FromUtf8Error,
    },
    #[error("not inside a git repository: {path}")]
    NotARepository { path: PathBuf },
    #[error("unexpected git output: {context}")]
    Parse { context: String },
    #[error("merge of '{branch}' into '{into}' failed and was aborted: {detail}")]
    MergeFailed {
        branch: String,
        into: String,
        detail: String,
    },
}
