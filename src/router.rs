//! Message router
//!
//! Turns an [`Intent`] into the list of deliveries it causes, given the
//! registry as it is when the intent is processed. Pure: no I/O, no
//! registry mutation.

use tracing::{debug, error};

use crate::codec::Intent;
use crate::registry::Registry;
use crate::types::SessionId;

/// Reply to a list-users request when nobody is named
pub const NO_USERS: &str = "Users: (None)";

/// Reply to a help request
pub const USAGE: &str = "Usage: ?/help: this screen
chat:msg       Send msg to all users
chat:user:msg  Send msg to user
listusers      Show logged-on users
quit           Exit chat program";

/// One message addressed to one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub target: SessionId,
    pub text: String,
}

impl Delivery {
    pub fn new(target: SessionId, text: impl Into<String>) -> Self {
        Self {
            target,
            text: text.into(),
        }
    }
}

/// Greeting for a newly admitted viewer
pub fn welcome(display_name: &str, target: SessionId) -> Delivery {
    Delivery::new(
        target,
        format!("Welcome to the \"{}\" Chat Server!", display_name),
    )
}

/// Compute the deliveries for one intent
pub fn route(intent: &Intent, registry: &Registry) -> Vec<Delivery> {
    match intent {
        Intent::Broadcast { sender, body } => {
            broadcast(registry, format!("{} says to all: {}", sender, body))
        }
        Intent::PrivateMessage {
            sender,
            recipient,
            body,
        } => match find_named(registry, recipient) {
            Some(target) => vec![Delivery::new(
                target,
                format!("{} sends you private message: {}", sender, body),
            )],
            None => {
                debug!("{} not logged on", recipient);
                reply(
                    registry,
                    sender,
                    format!("Sorry, no such user {}", recipient),
                )
            }
        },
        Intent::ListUsers { requester } => reply(registry, requester, user_list(registry)),
        Intent::Help { requester } => reply(registry, requester, USAGE),
        Intent::Relay { sender, text } => broadcast(registry, format!("{}: {}", sender, text)),
        Intent::Join { name } => broadcast(registry, format!("{} has joined the chat.", name)),
        Intent::Leave { name } => broadcast(registry, format!("{} has left the chat", name)),
    }
}

/// Text of a list-users reply
pub fn user_list(registry: &Registry) -> String {
    let names = registry.all_names();
    if names.is_empty() {
        NO_USERS.to_string()
    } else {
        format!("Users:\n{}", names.join("\n"))
    }
}

fn broadcast(registry: &Registry, text: String) -> Vec<Delivery> {
    registry
        .viewers()
        .iter()
        .map(|id| Delivery::new(*id, text.clone()))
        .collect()
}

fn reply(registry: &Registry, name: &str, text: impl Into<String>) -> Vec<Delivery> {
    match find_named(registry, name) {
        Some(target) => vec![Delivery::new(target, text)],
        None => {
            debug!("Dropping reply to unknown session '{}'", name);
            Vec::new()
        }
    }
}

/// Look up the single session registered under `name`
///
/// More than one match means the registry lost its uniqueness guarantee:
/// that panics in debug builds and is logged in release builds, where the
/// first match wins.
fn find_named(registry: &Registry, name: &str) -> Option<SessionId> {
    let matches = registry.sessions_named(name);
    if matches.len() > 1 {
        error!(
            "Name '{}' is registered to {} sessions",
            name,
            matches.len()
        );
        if cfg!(debug_assertions) {
            panic!("name '{}' registered more than once", name);
        }
    }
    matches.first().copied()
}
