use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha1::{Digest, Sha1};
use std::time::Instant;

use crate::models::{FrameDescriptor, MAIN_FRAME_ID};

/// Derive the frame id attached to every action from this frame.
///
/// The top-level context is always `main`. Child frames are named after the
/// hosting iframe's id/name/src; when the parent is cross-origin (or the iframe
/// carries none of those) a short hash of the frame URL is used instead.
pub fn frame_id(frame: &FrameDescriptor, url: &str) -> String {
    if frame.is_main {
        return MAIN_FRAME_ID.to_string();
    }

    if !frame.cross_origin {
        let parts: Vec<String> = [
            frame.element_id.as_deref().map(|v| format!("id={}", v.trim())),
            frame.element_name.as_deref().map(|v| format!("name={}", v.trim())),
            frame.element_src.as_deref().map(|v| format!("src={}", v.trim())),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.ends_with('='))
        .collect();

        if !parts.is_empty() {
            return format!("frame[{}]", parts.join("|"));
        }
    }

    format!("frame#{}", url_hash(url))
}

fn url_hash(url: &str) -> String {
    let digest = Sha1::digest(url.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..12].to_string()
}

#[derive(Debug, Clone)]
struct AttachedFrame {
    attached_at: Instant,
    documents: usize,
}

/// Tracks which frames have a live recorder instance.
///
/// `attach` is idempotent per (frame, document): the first envelope from a
/// document marks it attached, later ones are no-ops.
#[derive(Debug, Default)]
pub struct FrameRegistry {
    documents: DashMap<(String, String), Instant>,
    frames: DashMap<String, AttachedFrame>,
    /// Frames announced by the browser before any recorder reported from them
    observed: DashMap<String, Instant>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when this (frame, document) pair was not attached yet
    pub fn attach(&self, frame_id: &str, document_id: &str) -> bool {
        match self.documents.entry((frame_id.to_string(), document_id.to_string())) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
            }
        }

        let mut entry = self.frames.entry(frame_id.to_string()).or_insert(AttachedFrame {
            attached_at: Instant::now(),
            documents: 0,
        });
        entry.documents += 1;
        tracing::debug!(
            "Recorder attached in frame {} (document {}, #{} for this frame, first seen {:?} ago)",
            frame_id,
            document_id,
            entry.documents,
            entry.attached_at.elapsed()
        );
        true
    }

    /// Record a structural frame notification from the browser
    pub fn observe(&self, browser_frame_id: &str) {
        if self.observed.insert(browser_frame_id.to_string(), Instant::now()).is_none() {
            tracing::debug!("Browser reported new frame {}", browser_frame_id);
        }
    }

    /// Child frames the browser announced that never reported from a recorder.
    ///
    /// `Page.frameAttached` only fires for child frames, so the main frame is
    /// left out of the comparison.
    pub fn silent_frames(&self) -> usize {
        let reporting = self
            .frames
            .iter()
            .filter(|e| e.key().as_str() != MAIN_FRAME_ID)
            .count();
        self.observed.len().saturating_sub(reporting)
    }

    pub fn frame_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.frames.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn clear(&self) {
        self.documents.clear();
        self.frames.clear();
        self.observed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_frame() {
        assert_eq!(frame_id(&FrameDescriptor::main(), "https://a.example/"), "main");
    }

    #[test]
    fn test_child_frame_from_element_attributes() {
        let frame = FrameDescriptor {
            is_main: false,
            element_id: Some("payment".to_string()),
            element_name: None,
            element_src: Some("/pay".to_string()),
            cross_origin: false,
        };
        assert_eq!(frame_id(&frame, "https://a.example/pay"), "frame[id=payment|src=/pay]");
    }

    #[test]
    fn test_cross_origin_frame_hashes_url() {
        let frame = FrameDescriptor {
            is_main: false,
            cross_origin: true,
            ..Default::default()
        };
        let a = frame_id(&frame, "https://widget.example/embed");
        let b = frame_id(&frame, "https://widget.example/embed");
        let c = frame_id(&frame, "https://widget.example/other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("frame#"));
        assert_eq!(a.len(), "frame#".len() + 12);
    }

    #[test]
    fn test_attach_is_idempotent() {
        let registry = FrameRegistry::new();
        assert!(registry.attach("main", "doc-1"));
        assert!(!registry.attach("main", "doc-1"));
        // a new document after navigation attaches again
        assert!(registry.attach("main", "doc-2"));
        assert_eq!(registry.frame_ids(), vec!["main".to_string()]);

        registry.clear();
        assert!(registry.frame_ids().is_empty());
    }

    #[test]
    fn test_silent_frames() {
        let registry = FrameRegistry::new();
        registry.observe("A1B2");
        registry.observe("C3D4");
        registry.observe("C3D4");
        assert!(registry.attach("main", "doc-1"));
        assert_eq!(registry.silent_frames(), 2);

        assert!(registry.attach("frame[id=child]", "doc-2"));
        assert_eq!(registry.silent_frames(), 1);
    }
}
