//! Ledger sessions over USB HID through `ledger-transport-hid`

use ledger_transport::APDUCommand;
use ledger_transport_hid::hidapi::HidApi;
use ledger_transport_hid::TransportNativeHID;

use super::ledger::{check_status, split_command, ApduConnector, ApduTransport};
use super::session::Device;
use super::SignerError;

/// Opens the first Ledger found on the USB bus
#[derive(Clone, Copy, Debug, Default)]
pub struct HidApduConnector;

impl ApduConnector for HidApduConnector {
    fn connect(&self) -> Result<Box<dyn ApduTransport>, SignerError> {
        let api = HidApi::new()
            .map_err(|e| SignerError::DeviceCommunication(format!("HID: {}", e)))?;
        let transport = TransportNativeHID::new(&api)
            .map_err(|e| SignerError::DeviceCommunication(e.to_string()))?;
        log::debug!("Opened Ledger over HID");
        Ok(Box::new(HidApduTransport {
            transport: Some(transport),
            _api: api,
        }))
    }
}

/// An open HID channel; the device handle drops before the API context
pub struct HidApduTransport {
    transport: Option<TransportNativeHID>,
    _api: HidApi,
}

impl ApduTransport for HidApduTransport {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, SignerError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| SignerError::DeviceCommunication("session closed".to_string()))?;

        let ([cla, ins, p1, p2], data) = split_command(apdu)?;
        let command = APDUCommand {
            cla,
            ins,
            p1,
            p2,
            data: data.to_vec(),
        };
        let answer = transport
            .exchange(&command)
            .map_err(|e| SignerError::DeviceCommunication(e.to_string()))?;

        check_status(answer.retcode())?;
        Ok(answer.data().to_vec())
    }
}

impl Device for HidApduTransport {
    fn close(&mut self) {
        self.transport.take();
    }
}
