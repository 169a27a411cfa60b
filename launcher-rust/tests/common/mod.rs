#![allow(dead_code)]

use async_trait::async_trait;
use shoe_launcher::{Transport, TransportError};
use tokio::{io::AsyncWriteExt, sync::Notify};
use std::{
    collections::HashMap,
    io::{Cursor, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    for (name, contents) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[derive(Clone)]
pub enum Reply {
    Body(Vec<u8>),
    Fail(TransportError),
}

/// In-memory download server keyed by URL.
#[derive(Default)]
pub struct FakeServer {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    hold_binaries: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl FakeServer {
    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Body(body.into()));
    }

    pub fn fail(&self, url: &str, err: TransportError) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Fail(err));
    }

    /// Binary downloads wait on `release` after signalling `entered`.
    pub fn hold_binaries(&self) {
        self.hold_binaries.store(true, Ordering::SeqCst);
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    fn reply(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.replies.lock().unwrap().get(url) {
            Some(Reply::Body(b)) => Ok(b.clone()),
            Some(Reply::Fail(e)) => Err(e.clone()),
            None => Err(TransportError::fatal(format!("404 Not Found: {url}"))),
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn get_text(&self, url: &str, _timeout: Duration) -> Result<String, TransportError> {
        let body = self.reply(url)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn get_to_file(
        &self,
        url: &str,
        _timeout: Duration,
        dest: &mut tokio::fs::File,
    ) -> Result<u64, TransportError> {
        if self.hold_binaries.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let body = self.reply(url)?;
        dest.write_all(&body)
            .await
            .map_err(|e| TransportError::fatal(e.to_string()))?;
        dest.flush()
            .await
            .map_err(|e| TransportError::fatal(e.to_string()))?;
        Ok(body.len() as u64)
    }
}
