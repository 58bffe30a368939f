//! Service model and bounded component lists.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Audio tracks a service may carry at most.
pub const AUDIO_CHAN_MAX: usize = 32;
/// AC-3 / E-AC-3 tracks a service may carry at most.
pub const AC3_CHAN_MAX: usize = 32;
/// Subtitling streams a service may carry at most.
pub const SUBTITLE_MAX: usize = 8;

/// Push onto a full [`Bounded`] list.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("capacity {0} reached")]
pub struct AtCapacity(pub usize);

/// Growable list with an explicit capacity; a push at capacity is
/// rejected rather than silently overwriting.
#[derive(Debug, Clone)]
pub struct Bounded<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> Bounded<T> {
    pub fn new(capacity: usize) -> Self {
        Bounded {
            items: Vec::new(),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) -> Result<(), AtCapacity> {
        if self.items.len() >= self.capacity {
            return Err(AtCapacity(self.capacity));
        }
        self.items.push(item);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Serialize> Serialize for Bounded<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for item in &self.items {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

/// One audio elementary stream of a service.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AudioTrack {
    /// Elementary PID.
    pub pid: u16,
    /// Stream type from the PMT.
    pub stream_type: u8,
    /// ISO 639 language code, when announced.
    pub language: Option<String>,
}

/// A service (program) on a transport stream.
///
/// Created on first reference from PAT or SDT and enriched by the other
/// tables as their sections arrive.
#[derive(Debug, Clone, Serialize)]
pub struct Service {
    /// Service id (program number).
    pub service_id: u16,
    /// PMT PID from the PAT.
    pub pmt_pid: u16,
    /// PCR PID from the PMT.
    pub pcr_pid: u16,
    /// Primary video PID (first video stream wins).
    pub video_pid: u16,
    /// Stream type of the primary video stream.
    pub video_stream_type: u8,
    /// MPEG/AAC audio tracks.
    pub audio: Bounded<AudioTrack>,
    /// AC-3 and E-AC-3 tracks.
    pub ac3: Bounded<AudioTrack>,
    /// Subtitling stream PIDs.
    pub subtitling_pids: Bounded<u16>,
    /// Teletext PID, 0 if none.
    pub teletext_pid: u16,
    /// Provider name from the SDT.
    pub provider_name: Option<String>,
    /// Service name from the SDT.
    pub service_name: Option<String>,
    /// Service type from the SDT service descriptor.
    pub service_type: u8,
    /// Running status from the SDT (4 = running).
    pub running_status: u8,
    /// Scrambled per SDT free_CA_mode or PMT CA descriptors.
    pub scrambled: bool,
    /// CA system ids seen in CA and CA identifier descriptors.
    pub ca_system_ids: Vec<u16>,
}

impl Service {
    pub fn new(service_id: u16) -> Self {
        Service {
            service_id,
            pmt_pid: 0,
            pcr_pid: 0,
            video_pid: 0,
            video_stream_type: 0,
            audio: Bounded::new(AUDIO_CHAN_MAX),
            ac3: Bounded::new(AC3_CHAN_MAX),
            subtitling_pids: Bounded::new(SUBTITLE_MAX),
            teletext_pid: 0,
            provider_name: None,
            service_name: None,
            service_type: 0,
            running_status: 0,
            scrambled: false,
            ca_system_ids: Vec::new(),
        }
    }

    pub fn has_video(&self) -> bool {
        self.video_pid != 0
    }

    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty() || !self.ac3.is_empty()
    }

    /// Record a CA system id, keeping the list duplicate free.
    pub fn add_ca_system_id(&mut self, id: u16) {
        if !self.ca_system_ids.contains(&id) {
            self.ca_system_ids.push(id);
        }
    }

    /// Name for output lists; unnamed services get a placeholder.
    pub fn display_name(&self) -> String {
        match &self.service_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("service_id {}", self.service_id),
        }
    }
}
