//! Session resolution and caching

mod common;

use std::sync::Arc;

use rt_client::SessionResolver;
use rt_core::error::SessionError;
use rt_core::TransportMode;
use rt_protocol::{RpcRequest, RpcResponse, SessionId, SessionLookup};

use common::{record, MockRelay};

fn lookup(response: SessionLookup) -> Arc<MockRelay> {
    Arc::new(
        MockRelay::new(TransportMode::Relay).respond(move |request| match request {
            RpcRequest::GetSessionByHostname { .. } => Ok(RpcResponse::Session(response.clone())),
            RpcRequest::GetActiveSession { hostname } => {
                let host = hostname.as_deref().unwrap_or("any");
                Ok(RpcResponse::ActiveSession(Some(record("fresh", host))))
            }
            other => panic!("unexpected request {other:?}"),
        }),
    )
}

#[tokio::test]
async fn test_ambiguous_machine_is_not_cached() {
    let relay = lookup(SessionLookup::Ambiguous {
        matches_count: 2,
        hostnames: vec!["web-1".to_string(), "web-2".to_string()],
    });
    let sessions = SessionResolver::new(relay.clone());

    let err = sessions.set_machine("web", true).await.unwrap_err();
    match &err {
        SessionError::Ambiguous {
            hostname,
            matches_count,
            hostnames,
        } => {
            assert_eq!(hostname, "web");
            assert_eq!(*matches_count, 2);
            assert_eq!(hostnames.len(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("web"));
    assert!(message.contains('2'));

    assert!(sessions.current_hostname().is_none());
    assert!(sessions.current_session().is_none());
    assert!(matches!(sessions.resolve(None).await, Err(SessionError::NoSession)));
    assert_eq!(relay.calls().len(), 1);
}

#[tokio::test]
async fn test_found_machine_is_cached() {
    let relay = lookup(SessionLookup::Found(record("s-42", "db-primary")));
    let sessions = SessionResolver::new(relay.clone());

    let info = sessions.set_machine("db", true).await.unwrap();
    assert_eq!(info.session_id.as_str(), "s-42");
    assert_eq!(info.hostname, "db-primary");

    assert_eq!(sessions.current_hostname().as_deref(), Some("db-primary"));
    assert_eq!(sessions.resolve(None).await.unwrap().as_str(), "s-42");

    let RpcRequest::GetSessionByHostname {
        hostname,
        partial_match,
    } = &relay.calls()[0]
    else {
        panic!("expected a hostname lookup");
    };
    assert_eq!(hostname, "db");
    assert!(*partial_match);
    // Resolving a cached id needs no further calls
    assert_eq!(relay.calls().len(), 1);
}

#[tokio::test]
async fn test_not_found_carries_detail() {
    let relay = lookup(SessionLookup::NotFound {
        error: Some("machine offline".to_string()),
    });
    let sessions = SessionResolver::new(relay);

    let err = sessions.set_machine("ghost", false).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound { .. }));
    assert!(err.to_string().contains("machine offline"));
    assert!(sessions.current_hostname().is_none());
}

#[tokio::test]
async fn test_explicit_session_wins() {
    let relay = lookup(SessionLookup::Found(record("s-1", "box")));
    let sessions = SessionResolver::new(relay);
    sessions.set_machine("box", false).await.unwrap();

    let explicit = SessionId::new("s-explicit");
    assert_eq!(sessions.resolve(Some(&explicit)).await.unwrap(), explicit);
    // The explicit id becomes the cached one
    assert_eq!(sessions.resolve(None).await.unwrap(), explicit);
}

#[tokio::test]
async fn test_auto_detect_from_cached_hostname() {
    let relay = lookup(SessionLookup::Found(record("s-old", "box")));
    let sessions = SessionResolver::new(relay.clone());
    sessions.set_machine("box", false).await.unwrap();

    sessions.forget(&SessionId::new("s-old"));
    assert!(sessions.current_session().is_none());

    let session_id = sessions.resolve(None).await.unwrap();
    assert_eq!(session_id.as_str(), "fresh");
    assert_eq!(
        relay.calls().last(),
        Some(&RpcRequest::GetActiveSession {
            hostname: Some("box".to_string())
        })
    );
    assert_eq!(sessions.current_session().unwrap().hostname, "box");
}

#[tokio::test]
async fn test_forget_other_session_keeps_cache() {
    let sessions = SessionResolver::new(Arc::new(MockRelay::new(TransportMode::Relay)));
    sessions.set_session_id(SessionId::new("keep"));

    sessions.forget(&SessionId::new("other"));
    assert_eq!(sessions.resolve(None).await.unwrap().as_str(), "keep");

    sessions.clear();
    assert!(matches!(sessions.resolve(None).await, Err(SessionError::NoSession)));
}
