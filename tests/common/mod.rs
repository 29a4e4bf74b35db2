#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tether::prelude::*;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A host object with a native listener list, standing in for a DOM-style event target.
#[derive(Default)]
pub struct Node {
    pub native: Mutex<Vec<(String, Callback<str>, Option<bool>)>>,
}

impl Node {
    pub fn new() -> Arc<Self> {
        Arc::new(Node::default())
    }

    pub fn native_names(&self) -> Vec<String> {
        self.native
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _, _)| name.clone())
            .collect()
    }

    /// Delivers `event` to every native listener for `name`.
    pub fn dispatch(&self, name: &str, event: &str) {
        let listeners: Vec<_> = self
            .native
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, cb, _)| cb.clone())
            .collect();
        for listener in listeners {
            listener.call(event);
        }
    }
}

impl Subscribe for Node {
    type Event = str;
    type Options = bool;

    fn subscribe(&self, name: &str, callback: &Callback<str>, options: Option<&bool>) {
        self.native
            .lock()
            .unwrap()
            .push((name.to_string(), callback.clone(), options.copied()));
    }

    fn unsubscribe(&self, name: &str, callback: &Callback<str>, options: Option<&bool>) {
        let mut native = self.native.lock().unwrap();
        if let Some(idx) = native
            .iter()
            .position(|(n, cb, opts)| n == name && cb == callback && opts.as_ref() == options)
        {
            native.remove(idx);
        }
    }
}

pub fn noop() -> Callback<str> {
    Callback::new(|_| {})
}
