//! glovecap reads the binary stream of a pressure-sensing glove from a
//! serial port and turns it into per-sensor readings.
//!
//! The glove sends two kinds of packets, each starting with the marker
//! `AA 55 03 99`. A packet of kind `0x01` carries the first 128 bytes of a
//! frame and a packet of kind `0x02` the remaining 144. The pieces fit
//! together like this:
//!
//! - [packet_scanner] finds markers in the byte stream and cuts packets out.
//! - [frame_assembler] pairs each A packet with the B packet right after it.
//! - [remapper] reads each sensor's byte out of the 272-byte frame, using the
//!   offsets in a [sensor_table].
//! - [pipeline] chains those three together for one byte stream.
//! - [acquisition] runs a pipeline on its own thread and hands finished
//!   samples to consumers through a bounded [frame_queue].
//!
//! Everything is configured through a [config::GloveConfig], and the
//! `glovecap` binary wraps it all in a small command line tool.

#![warn(missing_docs)]
pub mod acquisition;
pub mod args;
pub mod config;
pub mod frame_assembler;
pub mod frame_queue;
pub mod gui;
pub mod packet_scanner;
pub mod pipeline;
pub mod remapper;
pub mod sensor_table;
pub mod stats;
pub mod transport;
