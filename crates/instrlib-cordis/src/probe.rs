//! Discovery support: telling a controller from an external sensor.
//!
//! Both boards answer the Cordis identify frame (`?ID`) with `ID ...`. A
//! CS-5090 is always a controller. Anything else gets one more exchange on
//! the probe's transient transport: a `?STAT` reply carrying `ADC::` comes
//! from a sensor board.

use std::time::Duration;

use tracing::debug;

use instrlib_core::transport::Transport;
use instrlib_core::types::DeviceKind;
use instrlib_text_io::channel::exchange_once;

use crate::models::ControllerVariant;
use crate::protocol::{self, ReplyRule, TERMINATOR};
use crate::status;

/// Resolve the device kind behind a matching `?ID` reply.
///
/// A failed `?STAT` exchange resolves to [`DeviceKind::FlowController`].
pub async fn resolve_kind(
    transport: &mut dyn Transport,
    id_reply: &str,
    timeout: Duration,
) -> DeviceKind {
    let model = protocol::parse_query_reply("ID", id_reply, ReplyRule::EchoedKeyword);
    if ControllerVariant::from_model_number(&model) == ControllerVariant::Cs5090 {
        return DeviceKind::FlowController;
    }

    match exchange_once(transport, &protocol::format_query("STAT"), TERMINATOR, timeout).await {
        Ok(reply) if status::is_sensor_status(&reply) => DeviceKind::ExternalSensor,
        Ok(_) => DeviceKind::FlowController,
        Err(e) => {
            debug!(model = %model, error = %e, "status probe failed, assuming controller");
            DeviceKind::FlowController
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instrlib_test_harness::MockTransport;

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn cs5090_needs_no_status_probe() {
        let mut mock = MockTransport::new();
        let kind = resolve_kind(&mut mock, "ID CS-5090 rev2", TIMEOUT).await;
        assert_eq!(kind, DeviceKind::FlowController);
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn sensor_status_marks_sensor() {
        let mut mock = MockTransport::new();
        mock.expect(b"?STAT\r", b"ADC::1.0 | SL::0 | SH::5 | OL::0 | OH::5\r");
        let kind = resolve_kind(&mut mock, "ID ES-100", TIMEOUT).await;
        assert_eq!(kind, DeviceKind::ExternalSensor);
    }

    #[tokio::test]
    async fn controller_status_marks_controller() {
        let mut mock = MockTransport::new();
        mock.expect(b"?STAT\r", b"STAT: C:0  S:0  E:0\r");
        let kind = resolve_kind(&mut mock, "ID CS-1000", TIMEOUT).await;
        assert_eq!(kind, DeviceKind::FlowController);
    }

    #[tokio::test]
    async fn silent_status_defaults_to_controller() {
        let mut mock = MockTransport::new();
        mock.expect(b"?STAT\r", b"");
        let kind = resolve_kind(&mut mock, "ID CS-1000", TIMEOUT).await;
        assert_eq!(kind, DeviceKind::FlowController);
    }
}
