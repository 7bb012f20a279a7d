//! Linux monitor-mode interface driven by `ip`, `iw` and `tcpdump`
//!
//! Mode and channel changes shell out to `ip`/`iw`. Frames are received by
//! spawning `tcpdump -U -w -` on the interface and parsing its pcap output on
//! a dedicated reader thread, which plays the role of the driver's rx context.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, Linktype, PcapBlockOwned, PcapError};
use tracing::{debug, error, info, warn};

use crate::frame::{frame_control, frame_type};

use super::radiotap::split_record;
use super::{DriverError, DriverOp, FilterMask, RadioDriver, RxCallback, RxPacket};

/// Code reported when a tool could not be spawned at all
const ERR_SPAWN: i32 = -1;

/// Reader buffer; must hold one full record at tcpdump's default snaplen
const PCAP_BUFFER_SIZE: usize = 512 * 1024;

/// State shared with the reader thread
struct Shared {
    callback: Mutex<Option<RxCallback>>,
    filter: AtomicU32,
    channel: AtomicU8,
}

/// Monitor-mode capture on a Linux wireless interface
pub struct MonitorInterface {
    iface: String,
    tcpdump_path: String,
    shared: Arc<Shared>,
    capture: Mutex<Option<Child>>,
}

impl MonitorInterface {
    pub fn new(iface: &str, tcpdump_path: &str) -> Self {
        Self {
            iface: iface.to_string(),
            tcpdump_path: tcpdump_path.to_string(),
            shared: Arc::new(Shared {
                callback: Mutex::new(None),
                filter: AtomicU32::new(FilterMask::ALL.bits()),
                channel: AtomicU8::new(0),
            }),
            capture: Mutex::new(None),
        }
    }

    /// Run a configuration tool, mapping a non-zero exit to its status code
    fn run_tool(&self, op: DriverOp, program: &str, args: &[&str]) -> Result<(), DriverError> {
        debug!("Executing: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                warn!("Failed to run {}: {}", program, e);
                DriverError::new(op, ERR_SPAWN)
            })?;

        if output.status.success() {
            return Ok(());
        }

        let code = output.status.code().unwrap_or(ERR_SPAWN);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("{} exited with {}: {}", program, code, stderr.trim());
        Err(DriverError::new(op, code))
    }

    fn set_link_type(&self, kind: &str) -> Result<(), DriverError> {
        let op = DriverOp::Promiscuous;
        self.run_tool(op, "ip", &["link", "set", &self.iface, "down"])?;
        self.run_tool(op, "iw", &["dev", &self.iface, "set", "type", kind])?;
        self.run_tool(op, "ip", &["link", "set", &self.iface, "up"])
    }

    fn start_capture(&self) -> Result<()> {
        let mut capture = self.capture.lock();
        if capture.is_some() {
            return Ok(());
        }

        let mut cmd = Command::new(&self.tcpdump_path);
        cmd.args(["-i", &self.iface, "-U", "-w", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!("Executing: {:?}", cmd);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.tcpdump_path))?;

        let stdout = child
            .stdout
            .take()
            .context("Failed to capture tcpdump stdout")?;

        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                let mut reader = std::io::BufReader::new(stderr);
                let mut line = String::new();
                while std::io::BufRead::read_line(&mut reader, &mut line).unwrap_or(0) > 0 {
                    if !line.trim().is_empty() {
                        debug!("[tcpdump] {}", line.trim());
                    }
                    line.clear();
                }
            });
        }

        let shared = self.shared.clone();
        thread::Builder::new()
            .name("wifi-rx".to_string())
            .spawn(move || {
                if let Err(e) = run_reader(stdout, shared) {
                    error!("Frame reader error: {:#}", e);
                }
            })
            .context("Failed to spawn reader thread")?;

        *capture = Some(child);
        Ok(())
    }

    fn stop_capture(&self) {
        if let Some(mut child) = self.capture.lock().take() {
            let _ = child.kill();
            let _ = child.wait();
            info!("tcpdump on {} stopped", self.iface);
        }
    }
}

impl RadioDriver for MonitorInterface {
    fn name(&self) -> &str {
        &self.iface
    }

    fn set_promiscuous(&self, enabled: bool) -> Result<(), DriverError> {
        if enabled {
            self.set_link_type("monitor")?;
            self.start_capture().map_err(|e| {
                error!("Failed to start frame capture on {}: {:#}", self.iface, e);
                DriverError::new(DriverOp::Promiscuous, ERR_SPAWN)
            })?;
            info!("{} is in monitor mode", self.iface);
            Ok(())
        } else {
            self.stop_capture();
            self.set_link_type("managed")
        }
    }

    fn set_filter(&self, mask: FilterMask) -> Result<(), DriverError> {
        self.shared.filter.store(mask.bits(), Ordering::SeqCst);
        Ok(())
    }

    fn set_rx_callback(&self, callback: Option<RxCallback>) -> Result<(), DriverError> {
        *self.shared.callback.lock() = callback;
        Ok(())
    }

    fn is_blocking(&self) -> bool {
        true
    }

    fn set_channel(&self, channel: u8) -> Result<(), DriverError> {
        let channel_arg = channel.to_string();
        self.run_tool(
            DriverOp::Channel,
            "iw",
            &["dev", &self.iface, "set", "channel", &channel_arg],
        )?;
        self.shared.channel.store(channel, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MonitorInterface {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

/// Reader loop (runs in dedicated thread until tcpdump exits)
fn run_reader<R: Read>(input: R, shared: Arc<Shared>) -> Result<()> {
    let mut reader = LegacyPcapReader::new(PCAP_BUFFER_SIZE, input)
        .map_err(|e| anyhow::anyhow!("{:?}", e))
        .context("Failed to read pcap header")?;

    let mut nanos = false;
    let mut frames = 0u64;
    let mut malformed = 0u64;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        if header.network != Linktype(127) {
                            bail!(
                                "interface is not delivering radiotap frames (link type {})",
                                header.network.0
                            );
                        }
                        nanos = matches!(header.magic_number, 0xa1b2_3c4d | 0x4d3c_b2a1);
                    }
                    PcapBlockOwned::Legacy(record) => {
                        let frac_us = if nanos {
                            record.ts_usec as u64 / 1000
                        } else {
                            record.ts_usec as u64
                        };
                        let timestamp_us = record.ts_sec as u64 * 1_000_000 + frac_us;
                        if dispatch(&shared, timestamp_us, record.data) {
                            frames += 1;
                        } else {
                            malformed += 1;
                        }
                    }
                    PcapBlockOwned::NG(_) => bail!("unexpected pcapng block in tcpdump output"),
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                if let Err(e) = reader.refill() {
                    bail!("pcap stream read failed: {:?}", e);
                }
            }
            Err(e) => bail!("pcap stream error: {:?}", e),
        }
    }

    info!("tcpdump stream ended. Frames: {}, malformed: {}", frames, malformed);
    Ok(())
}

/// Hand one radiotap record to the registered callback.
/// Returns false if the record could not be parsed.
fn dispatch(shared: &Shared, timestamp_us: u64, data: &[u8]) -> bool {
    let (mut rx_ctrl, payload) = match split_record(timestamp_us, data) {
        Ok(split) => split,
        Err(e) => {
            debug!("Skipping malformed record: {}", e);
            return false;
        }
    };

    let mask = FilterMask::from_bits(shared.filter.load(Ordering::Relaxed));
    if let Some(fc) = frame_control(payload) {
        if !mask.contains_type(frame_type(fc)) {
            return true;
        }
    }

    if rx_ctrl.channel == 0 {
        rx_ctrl.channel = shared.channel.load(Ordering::Relaxed);
    }

    let callback = shared.callback.lock().clone();
    if let Some(callback) = callback {
        callback(&RxPacket { payload, rx_ctrl });
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::RxControl;

    /// radiotap: flags(FCS) + rate + channel 2437 + signal -55 + noise -95
    const RADIOTAP: &str = "000010006e00000010028509a000c9a1";

    fn shared_with_log() -> (Arc<Shared>, Arc<Mutex<Vec<(Vec<u8>, RxControl)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let callback: RxCallback = Arc::new(move |packet: &RxPacket<'_>| {
            sink.lock().push((packet.payload.to_vec(), packet.rx_ctrl));
        });
        let shared = Arc::new(Shared {
            callback: Mutex::new(Some(callback)),
            filter: AtomicU32::new(FilterMask::ALL.bits()),
            channel: AtomicU8::new(0),
        });
        (shared, log)
    }

    fn pcap_stream(magic: u32, link_type: u32, records: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
        let mut stream = Vec::new();
        stream.extend_from_slice(&magic.to_le_bytes());
        stream.extend_from_slice(&2u16.to_le_bytes());
        stream.extend_from_slice(&4u16.to_le_bytes());
        stream.extend_from_slice(&[0u8; 8]);
        stream.extend_from_slice(&65535u32.to_le_bytes());
        stream.extend_from_slice(&link_type.to_le_bytes());
        for (ts_sec, ts_frac, data) in records {
            stream.extend_from_slice(&ts_sec.to_le_bytes());
            stream.extend_from_slice(&ts_frac.to_le_bytes());
            stream.extend_from_slice(&(data.len() as u32).to_le_bytes());
            stream.extend_from_slice(&(data.len() as u32).to_le_bytes());
            stream.extend_from_slice(data);
        }
        stream
    }

    fn beacon_record() -> (Vec<u8>, Vec<u8>) {
        let frame = hex::decode("80000000ffffffffffff001122334455001122334455").unwrap();
        let mut data = hex::decode(RADIOTAP).unwrap();
        data.extend_from_slice(&frame);
        data.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        (data, frame)
    }

    #[test]
    fn test_reader_delivers_radiotap_frames() {
        let (data, frame) = beacon_record();
        let stream = pcap_stream(0xa1b2_c3d4, 127, &[(3, 500, data), (4, 0, vec![0x00, 0x00])]);
        let (shared, log) = shared_with_log();

        run_reader(stream.as_slice(), shared).unwrap();

        let log = log.lock();
        assert_eq!(log.len(), 1);
        let (payload, rx_ctrl) = &log[0];
        assert_eq!(payload, &frame);
        assert_eq!(rx_ctrl.channel, 6);
        assert_eq!(rx_ctrl.rssi, -55);
        assert_eq!(rx_ctrl.sig_len as usize, frame.len() + 4);
        assert_eq!(rx_ctrl.timestamp_us, 3_000_500);
    }

    #[test]
    fn test_reader_applies_coarse_filter() {
        let (data, _) = beacon_record();
        let stream = pcap_stream(0xa1b2_c3d4, 127, &[(1, 0, data)]);
        let (shared, log) = shared_with_log();
        shared.filter.store(FilterMask::DATA.bits(), Ordering::SeqCst);

        run_reader(stream.as_slice(), shared).unwrap();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_reader_rejects_other_link_types() {
        // LINKTYPE_ETHERNET
        let stream = pcap_stream(0xa1b2_c3d4, 1, &[]);
        let (shared, _log) = shared_with_log();
        assert!(run_reader(stream.as_slice(), shared).is_err());
    }

    #[test]
    fn test_reader_rejects_non_pcap_input() {
        let (shared, _log) = shared_with_log();
        assert!(run_reader(&[0u8; 24][..], shared).is_err());
    }
}
