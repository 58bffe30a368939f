//! Channel model built up during a scan.

pub mod service;
pub mod transponder;

pub use service::{AtCapacity, AudioTrack, Bounded, Service};
pub use transponder::{
    Bandwidth, CodeRate, DeliverySystem, GuardInterval, Hierarchy, Modulation, Polarization,
    ScanType, TransmissionMode, Transponder,
};
