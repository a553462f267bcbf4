mod common;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rsp_trace_tools::libs::session::Session;
use rsp_trace_tools::libs::target_control::{Parameters, TargetControl};

use common::{spawn_mock_server, MockTarget};

const START_ADDRESS: u64 = 0x2400_0000;

fn header_bytes(
    last_index: u32,
    filter: u32,
    rte_cfg: u32,
    timestamp_frequency: u32,
    filter_copy: u32,
    buffer_size: u32,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(24);
    for word in [
        last_index,
        filter,
        rte_cfg,
        timestamp_frequency,
        filter_copy,
        buffer_size,
    ] {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

fn connect_and_build(
    port: u16,
    params: Parameters,
) -> TargetControl {
    let session = Session::connect(Ipv4Addr::LOCALHOST, port, None).unwrap();
    TargetControl::new(session, params)
}

fn bin_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rsp_trace_scenario_{}.bin", name))
}

/// Scenario 1: normal snapshot, no filter override.
#[test]
fn scenario_normal_snapshot() {
    let buffer_size_words = 2048u32;
    let rte_cfg = (6u32 << 24) | (1 << 1); // header_size_words=6, filtering_enabled
    let mut memory = header_bytes(100, 0x0000_000f, rte_cfg, 1_000_000, 0, buffer_size_words);
    memory.extend(vec![0u8; buffer_size_words as usize * 4]);

    let target = Arc::new(Mutex::new(MockTarget::new(START_ADDRESS, memory)));
    let (port, server) = spawn_mock_server(target.clone());

    let path = bin_path("normal");
    let params = Parameters {
        start_address: START_ADDRESS,
        size: 0,
        filter_override: None,
        clear: false,
        delay_ms: 0,
        bin_path: path.clone(),
    };
    let mut control = connect_and_build(port, params);
    control.snapshot().unwrap();

    let file_bytes = std::fs::read(&path).unwrap();
    assert_eq!(file_bytes.len(), 24 + 2048 * 4);
    assert_eq!(&file_bytes[4..8], &[0x0f, 0x00, 0x00, 0x00]);

    let final_filter = {
        let locked = target.lock().unwrap();
        u32::from_le_bytes(locked.memory[4..8].try_into().unwrap())
    };
    assert_eq!(final_filter, 0x0000_000f);

    std::fs::remove_file(&path).unwrap();
    drop(target);
    server.join().unwrap();
}

/// Scenario 2: explicit user filter override preserves the pre-pause
/// value in the file but writes the override back to the target.
#[test]
fn scenario_user_filter_override() {
    let buffer_size_words = 2048u32;
    let rte_cfg = (6u32 << 24) | (1 << 1);
    let mut memory = header_bytes(100, 0x0000_000f, rte_cfg, 1_000_000, 0, buffer_size_words);
    memory.extend(vec![0u8; buffer_size_words as usize * 4]);

    let target = Arc::new(Mutex::new(MockTarget::new(START_ADDRESS, memory)));
    let (port, server) = spawn_mock_server(target.clone());

    let path = bin_path("override");
    let params = Parameters {
        start_address: START_ADDRESS,
        size: 0,
        filter_override: Some(0x10),
        clear: false,
        delay_ms: 0,
        bin_path: path.clone(),
    };
    let mut control = connect_and_build(port, params);
    control.snapshot().unwrap();

    let file_bytes = std::fs::read(&path).unwrap();
    assert_eq!(&file_bytes[4..8], &[0x0f, 0x00, 0x00, 0x00]);

    let final_filter = {
        let locked = target.lock().unwrap();
        u32::from_le_bytes(locked.memory[4..8].try_into().unwrap())
    };
    assert_eq!(final_filter, 0x10);

    std::fs::remove_file(&path).unwrap();
    drop(target);
    server.join().unwrap();
}

/// Scenario 3: firmware turned logging off itself (filter == 0,
/// firmware-off allowed); the last meaningful filter (`filter_copy`)
/// is restored.
#[test]
fn scenario_firmware_disabled_filter() {
    let buffer_size_words = 64u32;
    let rte_cfg = (6u32 << 24) | (1 << 2); // header_size_words=6, firmware_off_allowed
    let mut memory = header_bytes(0, 0, rte_cfg, 1_000_000, 0x55, buffer_size_words);
    memory.extend(vec![0u8; buffer_size_words as usize * 4]);

    let target = Arc::new(Mutex::new(MockTarget::new(START_ADDRESS, memory)));
    let (port, server) = spawn_mock_server(target.clone());

    let path = bin_path("firmware_off");
    let params = Parameters {
        start_address: START_ADDRESS,
        size: 0,
        filter_override: None,
        clear: false,
        delay_ms: 0,
        bin_path: path.clone(),
    };
    let mut control = connect_and_build(port, params);
    control.snapshot().unwrap();

    let file_bytes = std::fs::read(&path).unwrap();
    assert_eq!(&file_bytes[4..8], &[0x00, 0x00, 0x00, 0x00]);

    let final_filter = {
        let locked = target.lock().unwrap();
        u32::from_le_bytes(locked.memory[4..8].try_into().unwrap())
    };
    assert_eq!(final_filter, 0x55);

    std::fs::remove_file(&path).unwrap();
    drop(target);
    server.join().unwrap();
}

/// Scenario 4: single-shot restart with `-clear` fills the buffer
/// region with `0xFF` and zeroes `last_index`, then restores the
/// filter unchanged.
#[test]
fn scenario_single_shot_clear() {
    let buffer_size_words = 16u32;
    let rte_cfg = (6u32 << 24) | (1 << 0) | (1 << 3); // single_shot_active + compile_enabled
    let mut memory = header_bytes(5, 0x1, rte_cfg, 1_000_000, 0, buffer_size_words);
    memory.extend(vec![0xAAu8; buffer_size_words as usize * 4]);

    let target = Arc::new(Mutex::new(MockTarget::new(START_ADDRESS, memory)));
    let (port, server) = spawn_mock_server(target.clone());

    let path = bin_path("single_shot_clear");
    let params = Parameters {
        start_address: START_ADDRESS,
        size: 0,
        filter_override: None,
        clear: true,
        delay_ms: 0,
        bin_path: path.clone(),
    };
    let mut control = connect_and_build(port, params);
    control.snapshot().unwrap();

    let (final_last_index, final_filter, buffer_region) = {
        let locked = target.lock().unwrap();
        let last_index = u32::from_le_bytes(locked.memory[0..4].try_into().unwrap());
        let filter = u32::from_le_bytes(locked.memory[4..8].try_into().unwrap());
        let buffer = locked.memory[24..].to_vec();
        (last_index, filter, buffer)
    };

    assert_eq!(final_last_index, 0);
    assert_eq!(final_filter, 0x1);
    assert!(buffer_region.iter().all(|&b| b == 0xFF));

    std::fs::remove_file(&path).unwrap();
    drop(target);
    server.join().unwrap();
}

/// Scenario 6: a start script mixing comments, blank lines, and the
/// `#delay`/`#init`/`#filter` meta-commands followed by one raw RSP
/// command, executed in order against the mock server.
#[test]
fn scenario_script_with_meta_commands() {
    use rsp_trace_tools::libs::executor::run_script;

    let buffer_size_words = 16u32;
    // Sized past the 0x24000100 scratch address the raw script line pokes,
    // not just the header+buffer region #init touches.
    let memory = vec![0u8; 0x200];

    let target = Arc::new(Mutex::new(MockTarget::new(START_ADDRESS, memory)));
    let (port, server) = spawn_mock_server(target.clone());

    let script_path = bin_path("init_script").with_extension("cmd");
    std::fs::write(
        &script_path,
        "##comment\n\n#delay 10\n#init 0x06000006 48000000\n#filter 1\nM24000100,4:DEADBEEF\n",
    )
    .unwrap();

    let params = Parameters {
        start_address: START_ADDRESS,
        size: 24 + buffer_size_words as u64 * 4,
        filter_override: None,
        clear: false,
        delay_ms: 0,
        bin_path: bin_path("init_script_out"),
    };
    let mut control = connect_and_build(port, params);
    run_script(&mut control, &script_path).unwrap();

    let requests = {
        let locked = target.lock().unwrap();
        locked.request_log.clone()
    };
    // qSupported / QStartNoAckMode from connect negotiation, then the
    // filter pause inside #init, the 24-byte header write, the #filter
    // restore, and finally the raw DEADBEEF write - all in that order.
    assert!(requests[0].starts_with("qSupported"));
    assert_eq!(requests[1], "QStartNoAckMode");

    let pause = requests.iter().position(|r| r.starts_with("M24000004,4:00000000")).unwrap();
    let header_write = requests.iter().position(|r| r.starts_with("M24000000,18:")).unwrap();
    let filter_restore = requests.iter().position(|r| r.starts_with("M24000004,4:01000000")).unwrap();
    let raw_write = requests.iter().position(|r| r.starts_with("M24000100,4:DEADBEEF")).unwrap();

    assert!(pause < header_write);
    assert!(header_write < filter_restore);
    assert!(filter_restore < raw_write);
    assert_eq!(raw_write, requests.len() - 1);

    std::fs::remove_file(&script_path).unwrap();
    drop(target);
    server.join().unwrap();
}

/// Scenario 5: a server that omits `QStartNoAckMode+` from its
/// `qSupported` reply must fail the connection with `UnsupportedServer`
/// before any memory read is ever issued.
#[test]
fn scenario_missing_no_ack_capability() {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf).unwrap();
        // No QStartNoAckMode+ in the feature list.
        stream.write_all(b"+$PacketSize=190#ca").unwrap();
    });

    let result = Session::connect(Ipv4Addr::LOCALHOST, port, None);
    assert!(matches!(
        result,
        Err(rsp_trace_tools::libs::error::RspError::UnsupportedServer)
    ));

    server.join().unwrap();
}
