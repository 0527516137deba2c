//! Typed wrappers over unary transport calls

use bytes::Bytes;

use rt_core::error::TransportError;
use rt_core::Transport;
use rt_protocol::{
    DirEntry, RemoteFileInfo, RpcRequest, RpcResponse, SessionId, SessionLookup, SessionRecord,
};

/// Turn a mismatched response into an error
fn reject(request: &'static str, response: RpcResponse) -> TransportError {
    match response {
        RpcResponse::Error { code, message } => TransportError::Remote { code, message },
        other => TransportError::UnexpectedResponse {
            request,
            got: format!("{:?}", other).chars().take(120).collect(),
        },
    }
}

async fn call_ok(transport: &dyn Transport, request: RpcRequest) -> Result<(), TransportError> {
    let name = request.name();
    match transport.call(request).await? {
        RpcResponse::Ok => Ok(()),
        other => Err(reject(name, other)),
    }
}

pub(crate) async fn send_input(
    transport: &dyn Transport,
    session_id: &SessionId,
    data: Bytes,
) -> Result<(), TransportError> {
    call_ok(
        transport,
        RpcRequest::SendInput {
            session_id: session_id.clone(),
            data,
        },
    )
    .await
}

pub(crate) async fn resize(
    transport: &dyn Transport,
    session_id: &SessionId,
    cols: u16,
    rows: u16,
) -> Result<(), TransportError> {
    call_ok(
        transport,
        RpcRequest::Resize {
            session_id: session_id.clone(),
            cols,
            rows,
        },
    )
    .await
}

pub(crate) async fn send_signal(
    transport: &dyn Transport,
    session_id: &SessionId,
    signal: i32,
) -> Result<(), TransportError> {
    call_ok(
        transport,
        RpcRequest::SendSignal {
            session_id: session_id.clone(),
            signal,
        },
    )
    .await
}

pub(crate) async fn close_session(
    transport: &dyn Transport,
    session_id: &SessionId,
) -> Result<(), TransportError> {
    call_ok(
        transport,
        RpcRequest::CloseSession {
            session_id: session_id.clone(),
        },
    )
    .await
}

pub(crate) async fn get_history(
    transport: &dyn Transport,
    session_id: &SessionId,
    limit: u32,
    offset: u32,
) -> Result<(Vec<String>, u32), TransportError> {
    let request = RpcRequest::GetHistory {
        session_id: session_id.clone(),
        limit,
        offset,
    };
    match transport.call(request).await? {
        RpcResponse::History { commands, total } => Ok((commands, total)),
        other => Err(reject("get_history", other)),
    }
}

pub(crate) async fn get_output(
    transport: &dyn Transport,
    session_id: &SessionId,
    limit: u32,
    offset: u64,
) -> Result<Bytes, TransportError> {
    let request = RpcRequest::GetOutput {
        session_id: session_id.clone(),
        limit,
        offset,
    };
    match transport.call(request).await? {
        RpcResponse::Output { data } => Ok(data),
        other => Err(reject("get_output", other)),
    }
}

pub(crate) async fn read_file(
    transport: &dyn Transport,
    session_id: &SessionId,
    path: &str,
    offset: u64,
    length: u32,
) -> Result<Bytes, TransportError> {
    let request = RpcRequest::ReadFile {
        session_id: session_id.clone(),
        path: path.to_string(),
        offset,
        length,
    };
    match transport.call(request).await? {
        RpcResponse::FileChunk { data } => Ok(data),
        other => Err(reject("read_file", other)),
    }
}

pub(crate) async fn list_dir(
    transport: &dyn Transport,
    session_id: &SessionId,
    path: &str,
) -> Result<Vec<DirEntry>, TransportError> {
    let request = RpcRequest::ListDir {
        session_id: session_id.clone(),
        path: path.to_string(),
    };
    match transport.call(request).await? {
        RpcResponse::DirListing { entries } => Ok(entries),
        other => Err(reject("list_dir", other)),
    }
}

pub(crate) async fn file_info(
    transport: &dyn Transport,
    session_id: &SessionId,
    path: &str,
) -> Result<RemoteFileInfo, TransportError> {
    let request = RpcRequest::FileInfo {
        session_id: session_id.clone(),
        path: path.to_string(),
    };
    match transport.call(request).await? {
        RpcResponse::FileInfo(info) => Ok(info),
        other => Err(reject("file_info", other)),
    }
}

pub(crate) async fn delete_file(
    transport: &dyn Transport,
    session_id: &SessionId,
    path: &str,
) -> Result<(), TransportError> {
    call_ok(
        transport,
        RpcRequest::DeleteFile {
            session_id: session_id.clone(),
            path: path.to_string(),
        },
    )
    .await
}

pub(crate) async fn session_by_hostname(
    transport: &dyn Transport,
    hostname: &str,
    partial_match: bool,
) -> Result<SessionLookup, TransportError> {
    let request = RpcRequest::GetSessionByHostname {
        hostname: hostname.to_string(),
        partial_match,
    };
    match transport.call(request).await? {
        RpcResponse::Session(lookup) => Ok(lookup),
        other => Err(reject("get_session_by_hostname", other)),
    }
}

pub(crate) async fn list_sessions(
    transport: &dyn Transport,
    hostname: Option<&str>,
) -> Result<Vec<SessionRecord>, TransportError> {
    let request = RpcRequest::ListSessions {
        hostname: hostname.map(str::to_string),
    };
    match transport.call(request).await? {
        RpcResponse::Sessions { sessions } => Ok(sessions),
        other => Err(reject("list_sessions", other)),
    }
}

pub(crate) async fn active_session(
    transport: &dyn Transport,
    hostname: Option<&str>,
) -> Result<Option<SessionRecord>, TransportError> {
    let request = RpcRequest::GetActiveSession {
        hostname: hostname.map(str::to_string),
    };
    match transport.call(request).await? {
        RpcResponse::ActiveSession(record) => Ok(record),
        other => Err(reject("get_active_session", other)),
    }
}

pub(crate) async fn create_session(
    transport: &dyn Transport,
    shell: Option<&str>,
) -> Result<SessionRecord, TransportError> {
    let request = RpcRequest::CreateSession {
        shell: shell.map(str::to_string),
    };
    match transport.call(request).await? {
        RpcResponse::Created(record) => Ok(record),
        other => Err(reject("create_session", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_protocol::RpcErrorCode;

    #[test]
    fn test_reject_remote_error() {
        let err = reject(
            "read_file",
            RpcResponse::Error {
                code: RpcErrorCode::NotFound,
                message: "no such file".to_string(),
            },
        );
        assert!(matches!(
            err,
            TransportError::Remote {
                code: RpcErrorCode::NotFound,
                ..
            }
        ));
    }

    #[test]
    fn test_reject_mismatched_variant() {
        let err = reject("get_output", RpcResponse::Ok);
        match err {
            TransportError::UnexpectedResponse { request, got } => {
                assert_eq!(request, "get_output");
                assert_eq!(got, "Ok");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
