//! Shared fixtures for router-level tests.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use axum::Router;
use chatops_rpc::{
    auth::Authenticator, handlers, registry::Invocation, signer::RequestSigner, AppState,
    CommandError, CommandRegistry,
};
use rsa::RsaPrivateKey;

pub const BASE_URL: &str = "http://test.host";

/// Index 0 is the primary key, 1 the alternate, 2 is trusted by nobody.
pub fn key(slot: usize) -> &'static RsaPrivateKey {
    static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();
    &KEYS.get_or_init(|| {
        let mut rng = rand::thread_rng();
        (0..3)
            .map(|_| RsaPrivateKey::new(&mut rng, 1024).expect("generate key"))
            .collect()
    })[slot]
}

pub fn signer(slot: usize) -> RequestSigner {
    RequestSigner::new(key(slot).clone(), "hubot", BASE_URL)
}

pub fn authenticator() -> Authenticator {
    Authenticator::new(
        Some(BASE_URL.into()),
        Some(key(0).to_public_key()),
        Some(key(1).to_public_key()),
    )
}

pub const WCID: &str = r"(?:where can i deploy|wcid)(?: (?<app>\S+))?";

/// The namespace the original controller tests exercised.
pub fn registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new("test", "ChatOps of and relating to testing");
    registry
        .register("wcid", WCID, "where can i deploy?", |inv: Invocation| async move {
            match inv.param("app") {
                None | Some("") => Err(CommandError::invalid_params("I need an app, every time")),
                Some("nope") => Err(CommandError::invalid_params("I need nope, sorry")),
                Some(app) => Ok(format!("You can deploy {app} just fine.")),
            }
        })
        .expect("wcid pattern")
        .register(
            "foobar",
            "(?:how can i foo and bar all at once)?",
            "how to foo and bar",
            |_| async { Ok("You just foo and bar like it just don't matter".to_string()) },
        )
        .expect("foobar pattern");
    registry
}

/// Registry whose `wcid` echoes its parameters as sorted `k=v` and whose
/// `whereami` echoes the room.
pub fn echo_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new("echo", "Echoes parameters");
    registry
        .register("wcid", WCID, "where can i deploy?", |inv: Invocation| async move {
            let mut pairs: Vec<_> = inv.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            pairs.sort();
            Ok(pairs.join(","))
        })
        .expect("wcid pattern")
        .register("whereami", r"where am i\??", "which room this is", |inv: Invocation| async move {
            Ok(inv.room.unwrap_or_default())
        })
        .expect("whereami pattern");
    registry
}

pub fn router_with(registry: CommandRegistry, auth: Authenticator, testing: bool) -> Router {
    let state = AppState::new(registry, auth, None)
        .expect("state")
        .with_testing_auth(testing);
    handlers::router(Arc::new(state))
}

pub fn router() -> Router {
    router_with(registry(), authenticator(), false)
}
