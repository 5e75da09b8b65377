use glovecap::{
    acquisition::{Acquisition, AcquisitionError},
    config::GloveConfig,
    packet_scanner::encode_packet,
    pipeline::GlovePipeline,
    sensor_table::SensorTable,
    transport::{ReadTransport, TransportError},
};

use std::{
    io::{Cursor, Write},
    sync::Arc,
    thread,
    time::Duration,
};

const SENSOR_MAP: &str = "\
sensor_id,x_mm,y_mm,region,data_frame_index
10,12.5,140.0,index_tip,22
11,13.0,138.5,index_tip,22
40,,,palm,200
41,,,palm,-1
";

fn load_table() -> Arc<SensorTable> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", SENSOR_MAP).unwrap();
    Arc::new(SensorTable::from_path(file.path()).unwrap())
}

fn glove_stream(config: &GloveConfig) -> Vec<u8> {
    let mut stream = vec![0x00, 0xAA, 0x55];
    stream.extend(encode_packet(&config.marker, 0x01, 0x06, &[0x05; 128]));
    stream.extend(encode_packet(&config.marker, 0x02, 0x06, &[0x07; 144]));
    // A lone B after the frame is dropped.
    stream.extend(encode_packet(&config.marker, 0x02, 0x06, &[0x01; 144]));
    stream.extend(encode_packet(&config.marker, 0x01, 0x06, &[0x10; 128]));
    stream.extend(encode_packet(&config.marker, 0x02, 0x06, &[0x20; 144]));
    stream
}

#[test]
fn csv_table_and_byte_stream_to_sensor_maps() {
    let config = GloveConfig {
        read_chunk_size: 37,
        ..GloveConfig::default()
    };
    let pipeline = GlovePipeline::new(&config, load_table()).unwrap();
    let mut acq = Acquisition::start(
        ReadTransport::new(Cursor::new(glove_stream(&config))),
        pipeline,
        &config,
    );

    let first = acq.get_next_sensor_map(Duration::from_secs(5)).unwrap();
    assert_eq!(first[&10], 0x05);
    assert_eq!(first[&11], 0x05);
    assert_eq!(first[&40], 0x07);
    assert!(!first.contains_key(&41));

    let second = acq.get_next_sensor_map(Duration::from_secs(5)).unwrap();
    assert_eq!(second[&10], 0x10);
    assert_eq!(second[&40], 0x20);

    while acq.is_running() {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(matches!(
        acq.stop(),
        Err(AcquisitionError::Transport(TransportError::Disconnected(_)))
    ));

    let stats = acq.stats();
    assert_eq!(stats.frames, 2);
    assert_eq!(stats.packets, 5);
    assert_eq!(stats.orphan_b, 1);
    assert_eq!(stats.bytes_discarded, 3);
    assert_eq!(acq.get_next_sensor_map(Duration::ZERO), None);
}
