#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Result, anyhow};
use league_standings::fetch::{Transport, TransportResponse};

pub fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[derive(Default)]
struct FakeState {
    responses: HashMap<String, VecDeque<TransportResponse>>,
    calls: Vec<(String, Vec<(String, String)>)>,
}

/// Scripted transport: each URL answers from its own queue; the last response repeats.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Rc<RefCell<FakeState>>,
}

impl FakeTransport {
    pub fn respond(&self, url: &str, status: u16, body: &str) -> &Self {
        self.state
            .borrow_mut()
            .responses
            .entry(url.to_string())
            .or_default()
            .push_back(TransportResponse {
                status,
                body: body.to_string(),
            });
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.state.borrow().calls.clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.state.borrow().calls.iter().filter(|(u, _)| u == url).count()
    }
}

impl Transport for FakeTransport {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<TransportResponse> {
        let mut state = self.state.borrow_mut();
        state.calls.push((
            url.to_string(),
            query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        let queue = state
            .responses
            .get_mut(url)
            .ok_or_else(|| anyhow!("connection refused: {url}"))?;
        let resp = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        resp.ok_or_else(|| anyhow!("connection refused: {url}"))
    }
}
