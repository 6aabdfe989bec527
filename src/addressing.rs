//! Node instance derivation and hierarchical path handling
//!
//! Message paths are namespaced by the producing node instance so sibling
//! nodes replicating into the same parent can never collide: the first `/`
//! separated segment of every stored path is the instance that produced it.
//!
//! An instance is the bare node name, or `name:token` for session-maker
//! nodes, where `token` is a short local session token minted at process
//! start and rotatable on demand. The token charset excludes the path
//! separator.

use rand::Rng;
use std::sync::RwLock;

/// Separator between path segments and between instance and suffix.
pub const PATH_SEPARATOR: char = '/';

const SESSION_TOKEN_LEN: usize = 6;
const SESSION_TOKEN_CHARS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a fresh local session token.
pub fn generate_session_token() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_TOKEN_LEN)
        .map(|_| SESSION_TOKEN_CHARS[rng.gen_range(0..SESSION_TOKEN_CHARS.len())] as char)
        .collect()
}

/// Identity of this node within the cluster's path namespace.
#[derive(Debug)]
pub struct NodeIdentity {
    node_name: String,
    /// Some(..) iff this node is a session maker.
    session_token: Option<RwLock<String>>,
}

impl NodeIdentity {
    pub fn new(node_name: impl Into<String>, session_maker: bool) -> Self {
        Self {
            node_name: node_name.into(),
            session_token: session_maker.then(|| RwLock::new(generate_session_token())),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn is_session_maker(&self) -> bool {
        self.session_token.is_some()
    }

    /// Current node instance: `name`, or `name:token` for session makers.
    pub fn instance(&self) -> String {
        match &self.session_token {
            Some(token) => {
                let token = token.read().expect("session token lock poisoned");
                format!("{}:{}", self.node_name, token)
            }
            None => self.node_name.clone(),
        }
    }

    /// Instance string for an explicitly named session token.
    pub fn instance_for_token(&self, token: &str) -> String {
        format!("{}:{}", self.node_name, token)
    }

    /// Mint a new local session token. Returns the new token, or `None`
    /// if this node is not a session maker.
    pub fn rotate_session_token(&self) -> Option<String> {
        let lock = self.session_token.as_ref()?;
        let fresh = generate_session_token();
        let mut token = lock.write().expect("session token lock poisoned");
        *token = fresh.clone();
        Some(fresh)
    }
}

/// Join a node instance and a caller-visible suffix into a full path.
pub fn compose_path(instance: &str, suffix: &str) -> String {
    format!("{instance}{PATH_SEPARATOR}{suffix}")
}

/// Split a full path into its segments. The first segment is the node
/// instance that produced the entry.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATOR).collect()
}

/// Drop the leading node-instance segment from a full path.
pub fn strip_instance(path: &str) -> &str {
    match path.split_once(PATH_SEPARATOR) {
        Some((_, suffix)) => suffix,
        None => "",
    }
}
