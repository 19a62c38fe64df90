//! UDP/OSC listener thread
//!
//! Best-effort extraction, not protocol validation: malformed or unmapped
//! inbound messages are silently dropped. Bundles are unpacked and their
//! messages dispatched individually.

use super::{BandMetric, CorticalAcquisition};
use crate::shutdown::Shutdown;
use rosc::{OscMessage, OscPacket, OscType};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

const ADDR_BATTERY: &str = "/muse/batt";
const ADDR_FOREHEAD: &str = "/muse/elements/touching_forehead";
const ADDR_HORSESHOE: &str = "/muse/elements/horseshoe";

/// Read timeout bounding shutdown latency
const RECV_TIMEOUT: Duration = Duration::from_millis(200);

pub(crate) fn spawn(
    acquisition: Arc<CorticalAcquisition>,
    socket: UdpSocket,
    shutdown: Shutdown,
) -> JoinHandle<()> {
    thread::spawn(move || listen_loop(acquisition, socket, shutdown))
}

fn listen_loop(acquisition: Arc<CorticalAcquisition>, socket: UdpSocket, shutdown: Shutdown) {
    if let Err(e) = socket.set_read_timeout(Some(RECV_TIMEOUT)) {
        warn!("could not set OSC socket read timeout: {e}");
    }
    let mut buf = [0u8; 4096];

    debug!("cortical listener thread started");
    while !shutdown.is_signalled() {
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => match rosc::decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => dispatch_packet(&acquisition, packet),
                Err(e) => debug!("ignoring undecodable datagram: {e}"),
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                warn!("cortical listener recv failed: {e}");
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
    debug!("cortical listener thread exiting");
}

fn dispatch_packet(acquisition: &CorticalAcquisition, packet: OscPacket) {
    match packet {
        OscPacket::Message(message) => dispatch_message(acquisition, &message),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                dispatch_packet(acquisition, inner);
            }
        }
    }
}

pub(crate) fn dispatch_message(acquisition: &CorticalAcquisition, message: &OscMessage) {
    if let Some(metric) = BandMetric::from_osc_address(&message.addr) {
        if let Some(channels) = four_channels(&message.args) {
            acquisition.record_band_power(metric, channels);
        }
        return;
    }

    match message.addr.as_str() {
        ADDR_FOREHEAD => {
            if let Some(value) = number(message.args.first()) {
                acquisition.record_forehead(value >= 0.5);
            }
        }
        ADDR_HORSESHOE => {
            if let Some(channels) = four_channels(&message.args) {
                acquisition.record_horseshoe(channels.map(|v| v as i32));
            }
        }
        ADDR_BATTERY => {
            // Hardware reports charge in hundredths of a percent
            if let Some(raw) = number(message.args.first()) {
                acquisition.record_battery(raw / 100.0);
            }
        }
        _ => {}
    }
}

fn number(arg: Option<&OscType>) -> Option<f64> {
    match arg? {
        OscType::Float(v) => Some(f64::from(*v)),
        OscType::Double(v) => Some(*v),
        OscType::Int(v) => Some(f64::from(*v)),
        OscType::Long(v) => Some(*v as f64),
        _ => None,
    }
}

/// First four numeric arguments; timestamping presets append extra
/// trailing arguments, which are ignored
fn four_channels(args: &[OscType]) -> Option<[f64; 4]> {
    if args.len() < 4 {
        return None;
    }
    let mut channels = [0.0; 4];
    for (slot, arg) in channels.iter_mut().zip(args.iter()) {
        *slot = number(Some(arg))?;
    }
    Some(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sources::CorticalSource;

    fn acquisition() -> Arc<CorticalAcquisition> {
        CorticalAcquisition::new(Arc::new(ManualClock::new()), Shutdown::new())
    }

    fn message(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn band_power_message_records_frontal_average() {
        let acq = acquisition();
        dispatch_message(
            &acq,
            &message(
                "/muse/elements/alpha_absolute",
                vec![
                    OscType::Float(10.0),
                    OscType::Float(4.0),
                    OscType::Float(6.0),
                    OscType::Float(99.0),
                ],
            ),
        );
        assert_eq!(acq.alpha_batch(), vec![5.0]);
    }

    #[test]
    fn timestamp_suffixed_messages_still_parse() {
        let acq = acquisition();
        dispatch_message(
            &acq,
            &message(
                "/muse/elements/alpha_absolute",
                vec![
                    OscType::Float(0.0),
                    OscType::Float(2.0),
                    OscType::Float(4.0),
                    OscType::Float(0.0),
                    OscType::Long(1_700_000_000),
                    OscType::Int(250),
                ],
            ),
        );
        assert_eq!(acq.alpha_batch(), vec![3.0]);
    }

    #[test]
    fn forehead_and_horseshoe_update_contact_state() {
        let acq = acquisition();
        dispatch_message(&acq, &message(ADDR_FOREHEAD, vec![OscType::Int(1)]));
        assert_eq!(acq.is_on_forehead(), Some(true));

        dispatch_message(&acq, &message(ADDR_FOREHEAD, vec![OscType::Int(0)]));
        assert_eq!(acq.is_on_forehead(), Some(false));

        dispatch_message(
            &acq,
            &message(
                ADDR_HORSESHOE,
                vec![
                    OscType::Float(1.0),
                    OscType::Float(2.0),
                    OscType::Float(1.0),
                    OscType::Float(4.0),
                ],
            ),
        );
        assert_eq!(acq.sensor_state(), Some([1, 2, 1, 4]));
    }

    #[test]
    fn battery_percent_is_scaled_from_hundredths() {
        let acq = acquisition();
        dispatch_message(&acq, &message(ADDR_BATTERY, vec![OscType::Int(8750)]));
        assert_eq!(acq.battery(), Some(87.5));
    }

    #[test]
    fn malformed_and_unmapped_messages_are_ignored() {
        let acq = acquisition();
        // Too few channels
        dispatch_message(
            &acq,
            &message("/muse/elements/alpha_absolute", vec![OscType::Float(1.0)]),
        );
        // Non-numeric argument
        dispatch_message(
            &acq,
            &message(ADDR_FOREHEAD, vec![OscType::String("yes".into())]),
        );
        // Unmapped address
        dispatch_message(&acq, &message("/muse/elements/blink", vec![OscType::Int(1)]));

        assert!(acq.alpha_batch().is_empty());
        assert_eq!(acq.is_on_forehead(), None);
    }

    #[test]
    fn bundles_unpack_to_individual_messages() {
        let acq = acquisition();
        let bundle = OscPacket::Bundle(rosc::OscBundle {
            timetag: rosc::OscTime {
                seconds: 0,
                fractional: 0,
            },
            content: vec![
                OscPacket::Message(message(ADDR_FOREHEAD, vec![OscType::Int(1)])),
                OscPacket::Message(message(
                    "/muse/elements/alpha_absolute",
                    vec![
                        OscType::Float(0.0),
                        OscType::Float(8.0),
                        OscType::Float(4.0),
                        OscType::Float(0.0),
                    ],
                )),
            ],
        });
        dispatch_packet(&acq, bundle);

        assert_eq!(acq.is_on_forehead(), Some(true));
        assert_eq!(acq.alpha_batch(), vec![6.0]);
    }
}
