//! The producer side: a thread that reads the transport, runs the pipeline
//! and fills the [FrameQueue].
//!
//! Consumers only ever see [Acquisition::get_next_sensor_map()] and friends;
//! the thread, the transport and the pipeline are private to this module.

use crate::config::{GloveConfig, MAX_READ_CHUNK};
use crate::frame_queue::FrameQueue;
use crate::pipeline::{GlovePipeline, SensorSample};
use crate::remapper::SensorMap;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::transport::{Transport, TransportError};

use log::{info, warn};
use std::{
    fmt,
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

enum Signal {
    Stop,
}

/// Why the acquisition thread ended on its own.
#[derive(Debug)]
pub enum AcquisitionError {
    /// The transport went away.
    Transport(TransportError),
    /// The thread panicked.
    JoinError,
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionError::Transport(e) => write!(f, "acquisition stopped: {}", e),
            AcquisitionError::JoinError => write!(f, "acquisition thread panicked"),
        }
    }
}

impl std::error::Error for AcquisitionError {}

impl From<TransportError> for AcquisitionError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

/// A running capture. Dropping it stops the thread.
pub struct Acquisition {
    handle: Option<thread::JoinHandle<Result<(), TransportError>>>,
    tx: mpsc::Sender<Signal>,
    queue: Arc<FrameQueue<SensorSample>>,
    stats: Arc<PipelineStats>,
}

impl Acquisition {
    /// Spawn the acquisition thread. It owns `transport` until it exits.
    /// Queue and read sizes come from `config`, clamped to the limits
    /// [GloveConfig::validate()] enforces.
    pub fn start<T>(transport: T, pipeline: GlovePipeline, config: &GloveConfig) -> Self
    where
        T: Transport + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Signal>();
        let queue = Arc::new(FrameQueue::new(config.queue_capacity, config.backpressure));
        let stats = Arc::new(PipelineStats::new());

        let th_queue = Arc::clone(&queue);
        let th_stats = Arc::clone(&stats);
        let chunk_size = config.read_chunk_size.clamp(1, MAX_READ_CHUNK);

        let handle = thread::spawn(move || {
            run_loop(transport, pipeline, rx, &th_queue, &th_stats, chunk_size)
        });

        Acquisition {
            handle: Some(handle),
            tx,
            queue,
            stats,
        }
    }

    /// The sensor values of the next frame, waiting at most `timeout`.
    pub fn get_next_sensor_map(&self, timeout: Duration) -> Option<SensorMap> {
        self.next_sample(timeout).map(|s| s.values)
    }

    /// The next frame with its number and timestamp, waiting at most `timeout`.
    pub fn next_sample(&self, timeout: Duration) -> Option<SensorSample> {
        self.queue.pop_timeout(timeout)
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// A handle for reading samples from another thread.
    pub fn receiver(&self) -> SampleReceiver {
        SampleReceiver {
            queue: Arc::clone(&self.queue),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Whether the thread is still reading.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the thread to stop and wait for it. Returns the error that ended
    /// it early, if any. Samples already queued stay readable.
    pub fn stop(&mut self) -> Result<(), AcquisitionError> {
        // The thread may already be gone, in which case nobody is listening.
        let _ = self.tx.send(Signal::Stop);

        match self.handle.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| AcquisitionError::JoinError)?
                .map_err(AcquisitionError::from),
            None => Ok(()),
        }
    }
}

/// The consumer end of an [Acquisition], cheap to clone and send to other
/// threads. It keeps working after the acquisition stops, until the queue
/// runs dry.
#[derive(Debug, Clone)]
pub struct SampleReceiver {
    queue: Arc<FrameQueue<SensorSample>>,
    stats: Arc<PipelineStats>,
}

impl SampleReceiver {
    /// See [Acquisition::get_next_sensor_map()].
    pub fn get_next_sensor_map(&self, timeout: Duration) -> Option<SensorMap> {
        self.next_sample(timeout).map(|s| s.values)
    }

    /// See [Acquisition::next_sample()].
    pub fn next_sample(&self, timeout: Duration) -> Option<SensorSample> {
        self.queue.pop_timeout(timeout)
    }

    /// See [Acquisition::stats()].
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("{}", e);
        }
    }
}

fn run_loop<T: Transport>(
    mut transport: T,
    mut pipeline: GlovePipeline,
    rx: mpsc::Receiver<Signal>,
    queue: &FrameQueue<SensorSample>,
    stats: &PipelineStats,
    chunk_size: usize,
) -> Result<(), TransportError> {
    info!("Acquisition started");
    let mut buf = vec![0u8; chunk_size];

    let result = loop {
        match rx.try_recv() {
            Ok(Signal::Stop) | Err(mpsc::TryRecvError::Disconnected) => break Ok(()),
            Err(mpsc::TryRecvError::Empty) => {}
        }

        match transport.read_chunk(&mut buf) {
            Ok(n) => {
                for sample in pipeline.process(&buf[..n]) {
                    queue.push(sample);
                }
            }
            Err(TransportError::Timeout) => {}
            Err(e) => {
                warn!("{}", e);
                break Err(e);
            }
        }

        publish(&pipeline, queue, stats);
    };

    publish(&pipeline, queue, stats);
    info!("Acquisition stopped after {} frames", pipeline.stats().frames);
    result
}

fn publish(pipeline: &GlovePipeline, queue: &FrameQueue<SensorSample>, stats: &PipelineStats) {
    stats.publish(&StatsSnapshot {
        queue_drops: queue.dropped(),
        queue_depth: queue.len() as u64,
        ..pipeline.stats()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackpressurePolicy;
    use crate::packet_scanner::encode_packet;
    use crate::sensor_table::{SensorDescriptor, SensorTable};
    use crate::transport::ReadTransport;
    use std::io::{self, Cursor, Read};
    use std::time::Instant;

    const MARKER: [u8; 4] = [0xAA, 0x55, 0x03, 0x99];

    fn table() -> Arc<SensorTable> {
        Arc::new(
            SensorTable::new(vec![SensorDescriptor {
                id: 10,
                offset: Some(22),
                region: "index_tip".to_owned(),
                position: None,
            }])
            .unwrap(),
        )
    }

    fn stream(frames: u8) -> Vec<u8> {
        let mut out = Vec::new();
        for i in 0..frames {
            out.extend(encode_packet(&MARKER, 0x01, 0x06, &[i; 128]));
            out.extend(encode_packet(&MARKER, 0x02, 0x06, &[0; 144]));
        }
        out
    }

    fn start(reader: impl Read + Send + 'static, config: &GloveConfig) -> Acquisition {
        let pipeline = GlovePipeline::new(config, table()).unwrap();
        Acquisition::start(ReadTransport::new(reader), pipeline, config)
    }

    /// Always times out, like an idle serial port.
    struct Idle;

    impl Read for Idle {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(5));
            Err(io::Error::from(io::ErrorKind::TimedOut))
        }
    }

    #[test]
    fn delivers_frames_in_order_then_reports_disconnect() {
        let config = GloveConfig {
            read_chunk_size: 100,
            ..GloveConfig::default()
        };
        let mut acq = start(Cursor::new(stream(5)), &config);

        let values: Vec<u8> = (0..5)
            .map(|_| acq.get_next_sensor_map(Duration::from_secs(5)).unwrap()[&10])
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(acq.get_next_sensor_map(Duration::from_millis(20)), None);

        assert!(matches!(
            acq.stop_after_disconnect(),
            Err(AcquisitionError::Transport(TransportError::Disconnected(_)))
        ));
        assert_eq!(acq.stats().frames, 5);
        assert!(!acq.is_running());
    }

    #[test]
    fn waits_without_deadline() {
        let mut acq = start(Cursor::new(stream(1)), &GloveConfig::default());

        let map = acq.get_next_sensor_map(Duration::MAX).unwrap();
        assert_eq!(map[&10], 0);

        let rx = acq.receiver();
        let _ = acq.stop_after_disconnect();
        assert_eq!(rx.stats().frames, 1);
    }

    #[test]
    fn oversized_config_still_starts() {
        let config = GloveConfig {
            queue_capacity: usize::MAX,
            read_chunk_size: usize::MAX,
            ..GloveConfig::default()
        };
        assert!(config.validate().is_err());
        let pipeline = GlovePipeline::new(&GloveConfig::default(), table()).unwrap();
        let mut acq = Acquisition::start(
            ReadTransport::new(Cursor::new(stream(2))),
            pipeline,
            &config,
        );

        assert_eq!(acq.get_next_sensor_map(Duration::from_secs(5)).unwrap()[&10], 0);
        assert_eq!(acq.get_next_sensor_map(Duration::from_secs(5)).unwrap()[&10], 1);
        let _ = acq.stop_after_disconnect();
    }

    #[test]
    fn samples_are_numbered() {
        let mut acq = start(Cursor::new(stream(3)), &GloveConfig::default());

        let numbers: Vec<u64> = (0..3)
            .map(|_| acq.next_sample(Duration::from_secs(5)).unwrap().frame_number)
            .collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        let _ = acq.stop();
    }

    #[test]
    fn stop_returns_within_a_read_timeout() {
        let mut acq = start(Idle, &GloveConfig::default());
        assert!(acq.is_running());

        let start = Instant::now();
        assert!(acq.stop().is_ok());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!acq.is_running());
    }

    #[test]
    fn full_queue_drops_are_counted() {
        let config = GloveConfig {
            queue_capacity: 2,
            backpressure: BackpressurePolicy::DropOldest,
            ..GloveConfig::default()
        };
        let mut acq = start(Cursor::new(stream(6)), &config);
        let _ = acq.stop_after_disconnect();

        let stats = acq.stats();
        assert_eq!(stats.frames, 6);
        assert_eq!(stats.queue_drops, 4);

        let left: Vec<u8> = std::iter::from_fn(|| acq.get_next_sensor_map(Duration::ZERO))
            .map(|m| m[&10])
            .collect();
        assert_eq!(left, vec![4, 5]);
    }

    #[test]
    fn receiver_works_from_another_thread() {
        let mut acq = start(Cursor::new(stream(4)), &GloveConfig::default());
        let rx = acq.receiver();

        let th = thread::spawn(move || {
            (0..4)
                .filter_map(|_| rx.get_next_sensor_map(Duration::from_secs(5)))
                .map(|m| m[&10])
                .collect::<Vec<u8>>()
        });

        assert_eq!(th.join().unwrap(), vec![0, 1, 2, 3]);
        let _ = acq.stop_after_disconnect();
        assert_eq!(acq.receiver().stats().frames, 4);
    }

    impl Acquisition {
        /// Waits for a finite reader to run dry before stopping.
        fn stop_after_disconnect(&mut self) -> Result<(), AcquisitionError> {
            while self.is_running() {
                thread::sleep(Duration::from_millis(1));
            }
            self.stop()
        }
    }
}
