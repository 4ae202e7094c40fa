//! Background execution of backend calls.
//!
//! Work runs on rayon's global pool; results come back over a channel and are
//! drained by the UI thread once per frame. Session results carry the
//! generation of the session that asked for them so stale answers can be
//! recognised and dropped.

use crate::api::{AnnotationBackend, ImageId, ProcessedImage};
use crate::catalog::ClassFilter;
use crate::error::ClientError;
use crate::image_loader::LoadedImage;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

pub enum SessionEvent {
    Detections(Result<ProcessedImage, ClientError>),
    Image(Result<LoadedImage, ClientError>),
    Saved(Result<(), ClientError>),
}

pub enum JobOutput {
    ImageList {
        filter: ClassFilter,
        result: Result<Vec<ImageId>, ClientError>,
    },
    Upload(Result<Vec<ImageId>, ClientError>),
    Session {
        generation: u64,
        event: SessionEvent,
    },
}

pub struct Jobs {
    backend: Arc<dyn AnnotationBackend>,
    tx: Sender<JobOutput>,
    rx: Receiver<JobOutput>,
    repaint: Option<egui::Context>,
    in_flight: usize,
}

impl Jobs {
    pub fn new(backend: Arc<dyn AnnotationBackend>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            tx,
            rx,
            repaint: None,
            in_flight: 0,
        }
    }

    /// Wakes the UI whenever a job finishes.
    pub fn with_repaint(mut self, ctx: egui::Context) -> Self {
        self.repaint = Some(ctx);
        self
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    /// Runs `job` against the backend on the worker pool.
    pub fn spawn<F>(&mut self, job: F)
    where
        F: FnOnce(&dyn AnnotationBackend) -> JobOutput + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let repaint = self.repaint.clone();
        self.in_flight += 1;
        rayon::spawn(move || {
            let output = job(backend.as_ref());
            if tx.send(output).is_err() {
                log::debug!("Job finished after the receiver was dropped");
            }
            if let Some(ctx) = repaint {
                ctx.request_repaint();
            }
        });
    }

    /// Results that have arrived since the last call.
    pub fn drain(&mut self) -> Vec<JobOutput> {
        let outputs: Vec<JobOutput> = self.rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(outputs.len());
        outputs
    }

    pub fn refresh_images(&mut self, filter: ClassFilter, class_name: Option<String>) {
        log::debug!("Listing images for {filter:?}");
        self.spawn(move |backend| JobOutput::ImageList {
            filter,
            result: backend.list_images(class_name.as_deref()),
        });
    }

    #[cfg(test)]
    pub fn wait(&mut self, timeout: std::time::Duration) -> Option<JobOutput> {
        let output = self.rx.recv_timeout(timeout).ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(output)
    }
}
