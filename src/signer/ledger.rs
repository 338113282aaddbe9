//! Ledger backend
//!
//! Talks to the Ethereum app through raw APDUs. The app can sign an EIP-712
//! digest from a precomputed domain/message hash pair; it is not used for
//! transaction signing.

use alloy_primitives::{Address, B256};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::str::FromStr;

use super::derivation::DerivationPath;
use super::session::{Device, DeviceSession};
use super::{check_address, SignerError};
use crate::crypto::{Signature, SIGNATURE_LENGTH};

const CLA: u8 = 0xE0;
const INS_GET_ADDRESS: u8 = 0x02;
const INS_SIGN_EIP712_HASH: u8 = 0x0C;
/// Ask the device to show the address for confirmation
const P1_CONFIRM: u8 = 0x01;
const P1_NONE: u8 = 0x00;
const P2_NONE: u8 = 0x00;

/// Status word of a successful command
pub const SW_OK: u16 = 0x9000;

/// Default address of a speculos emulator or an APDU TCP proxy
pub const DEFAULT_PROXY_ADDRESS: &str = "127.0.0.1:9999";

/// Largest response body accepted from a TCP endpoint
pub const MAX_APDU_RESPONSE: usize = 64 * 1024;

/// An open APDU channel to the device
pub trait ApduTransport: Device {
    /// Send one command and return the response data without the status word
    ///
    /// Any status word other than [`SW_OK`] is reported as
    /// [`SignerError::DeviceIo`].
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// Opens APDU channels
pub trait ApduConnector {
    fn connect(&self) -> Result<Box<dyn ApduTransport>, SignerError>;
}

/// Build a short command APDU
fn command(ins: u8, p1: u8, p2: u8, data: &[u8]) -> Result<Vec<u8>, SignerError> {
    let lc = u8::try_from(data.len())
        .map_err(|_| SignerError::DeviceIo(format!("APDU payload of {} bytes", data.len())))?;
    let mut apdu = Vec::with_capacity(5 + data.len());
    apdu.extend_from_slice(&[CLA, ins, p1, p2, lc]);
    apdu.extend_from_slice(data);
    Ok(apdu)
}

/// Split a short command APDU into its `CLA INS P1 P2` header and payload
pub fn split_command(apdu: &[u8]) -> Result<([u8; 4], &[u8]), SignerError> {
    let malformed = || SignerError::DeviceIo(format!("malformed APDU of {} bytes", apdu.len()));
    if apdu.len() < 5 || usize::from(apdu[4]) != apdu.len() - 5 {
        return Err(malformed());
    }
    Ok(([apdu[0], apdu[1], apdu[2], apdu[3]], &apdu[5..]))
}

/// Map a status word to the command outcome
pub fn check_status(sw: u16) -> Result<(), SignerError> {
    if sw != SW_OK {
        return Err(SignerError::DeviceIo(format!("status word {:#06x}", sw)));
    }
    Ok(())
}

/// Query the address at `path`
pub fn get_address(
    transport: &mut dyn ApduTransport,
    path: &DerivationPath,
) -> Result<Address, SignerError> {
    let apdu = command(INS_GET_ADDRESS, P1_CONFIRM, P2_NONE, &path.to_apdu_bytes())?;
    let response = transport.exchange(&apdu)?;
    parse_address_response(&response)
}

/// Response layout: pk_len || public_key || addr_len || ascii hex address
fn parse_address_response(response: &[u8]) -> Result<Address, SignerError> {
    let malformed = || SignerError::DeviceIo("malformed address response".to_string());

    let pk_len = *response.first().ok_or_else(malformed)? as usize;
    let addr_len_offset = 1 + pk_len;
    let addr_len = *response.get(addr_len_offset).ok_or_else(malformed)? as usize;
    let start = addr_len_offset + 1;
    let ascii = response.get(start..start + addr_len).ok_or_else(malformed)?;
    let text = std::str::from_utf8(ascii).map_err(|_| malformed())?;

    Address::from_str(text).map_err(|e| SignerError::DeviceIo(format!("address {}: {}", text, e)))
}

/// Sign the EIP-712 digest of a hash pair at `path`
pub fn sign_hash_pair(
    transport: &mut dyn ApduTransport,
    path: &DerivationPath,
    domain_hash: &B256,
    message_hash: &B256,
) -> Result<Signature, SignerError> {
    let mut data = path.to_apdu_bytes();
    data.extend_from_slice(domain_hash.as_slice());
    data.extend_from_slice(message_hash.as_slice());

    let apdu = command(INS_SIGN_EIP712_HASH, P1_NONE, P2_NONE, &data)?;
    let response = transport.exchange(&apdu)?;
    if response.len() < SIGNATURE_LENGTH {
        return Err(SignerError::DeviceIo(format!(
            "signature response of {} bytes",
            response.len()
        )));
    }

    // The device answers v || r || s
    Ok(Signature::new(
        B256::from_slice(&response[1..33]),
        B256::from_slice(&response[33..65]),
        response[0],
    ))
}

/// Signer backed by a Ledger device
pub struct LedgerSigner {
    connector: Box<dyn ApduConnector>,
    index: u32,
}

impl LedgerSigner {
    pub fn new(connector: Box<dyn ApduConnector>, index: u32) -> Self {
        Self { connector, index }
    }

    pub fn path(&self) -> Result<DerivationPath, SignerError> {
        DerivationPath::ledger(self.index)
    }

    fn open(&self) -> Result<DeviceSession<dyn ApduTransport>, SignerError> {
        Ok(DeviceSession::new(self.connector.connect()?, "Ledger"))
    }

    pub fn verify_address(&self, expected: Address) -> Result<Address, SignerError> {
        let path = self.path()?;
        let mut session = self.open()?;
        let actual = get_address(&mut *session, &path)?;
        check_address(expected, actual)?;
        Ok(actual)
    }

    pub fn sign_typed_data_hash(
        &self,
        expected: Address,
        domain_hash: &B256,
        message_hash: &B256,
    ) -> Result<Signature, SignerError> {
        let path = self.path()?;
        let mut session = self.open()?;
        check_address(expected, get_address(&mut *session, &path)?)?;
        log::info!("Confirm the signature on the Ledger ({})", path);
        sign_hash_pair(&mut *session, &path, domain_hash, message_hash)
    }
}

/// Connects to an APDU TCP endpoint such as the speculos emulator
#[derive(Clone, Debug)]
pub struct TcpApduConnector {
    address: String,
}

impl TcpApduConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Default for TcpApduConnector {
    fn default() -> Self {
        Self::new(DEFAULT_PROXY_ADDRESS)
    }
}

impl ApduConnector for TcpApduConnector {
    fn connect(&self) -> Result<Box<dyn ApduTransport>, SignerError> {
        let stream = TcpStream::connect(&self.address).map_err(|e| {
            SignerError::DeviceCommunication(format!("Ledger at {}: {}", self.address, e))
        })?;
        Ok(Box::new(TcpApduTransport {
            stream: Some(stream),
        }))
    }
}

/// APDU channel framed as `u32 length || apdu`, answered by
/// `u32 length || data || status word`
pub struct TcpApduTransport {
    stream: Option<TcpStream>,
}

impl TcpApduTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }
}

fn io_error(e: std::io::Error) -> SignerError {
    SignerError::DeviceCommunication(e.to_string())
}

impl ApduTransport for TcpApduTransport {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, SignerError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SignerError::DeviceCommunication("session closed".to_string()))?;

        let mut frame = Vec::with_capacity(4 + apdu.len());
        frame.extend_from_slice(&(apdu.len() as u32).to_be_bytes());
        frame.extend_from_slice(apdu);
        stream.write_all(&frame).map_err(io_error)?;

        let mut len = [0u8; 4];
        stream.read_exact(&mut len).map_err(io_error)?;
        let len = u32::from_be_bytes(len) as usize;
        if len > MAX_APDU_RESPONSE {
            return Err(SignerError::DeviceIo(format!(
                "response of {} bytes exceeds {}",
                len, MAX_APDU_RESPONSE
            )));
        }

        let mut data = vec![0u8; len + 2];
        stream.read_exact(&mut data).map_err(io_error)?;
        let sw = u16::from_be_bytes([data[len], data[len + 1]]);
        data.truncate(len);

        check_status(sw)?;
        Ok(data)
    }
}

impl Device for TcpApduTransport {
    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::testing::{FakeLedger, FakeLedgerConnector};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_get_address_apdu() {
        let mut device = FakeLedger::new(Address::repeat_byte(0xab));
        let address = get_address(&mut device, &DerivationPath::ledger(2).unwrap()).unwrap();

        assert_eq!(address, Address::repeat_byte(0xab));
        let apdu = &device.apdus()[0];
        assert_eq!(&apdu[..5], &[0xE0, 0x02, 0x01, 0x00, 21]);
        assert_eq!(&apdu[5..], DerivationPath::ledger(2).unwrap().to_apdu_bytes().as_slice());
    }

    #[test]
    fn test_sign_hash_pair_apdu() {
        let mut device = FakeLedger::new(Address::repeat_byte(0xab));
        let domain = B256::repeat_byte(0x0d);
        let message = B256::repeat_byte(0x0e);

        let sig = sign_hash_pair(&mut device, &DerivationPath::ledger(0).unwrap(), &domain, &message)
            .unwrap();
        assert_eq!(sig, FakeLedger::signature_for(&domain, &message));

        let apdu = &device.apdus()[0];
        assert_eq!(&apdu[..5], &[0xE0, 0x0C, 0x00, 0x00, 21 + 64]);
        assert_eq!(&apdu[apdu.len() - 64..apdu.len() - 32], domain.as_slice());
        assert_eq!(&apdu[apdu.len() - 32..], message.as_slice());
    }

    #[test]
    fn test_malformed_address_response() {
        assert!(matches!(
            parse_address_response(&[65, 1, 2]),
            Err(SignerError::DeviceIo(_))
        ));
        assert!(parse_address_response(&[]).is_err());
    }

    #[test]
    fn test_mismatch_closes_session() {
        let device = FakeLedger::new(Address::repeat_byte(0xab));
        let signer = LedgerSigner::new(Box::new(FakeLedgerConnector::new(device.clone())), 0);

        let result = signer.sign_typed_data_hash(
            Address::repeat_byte(0xcd),
            &B256::ZERO,
            &B256::ZERO,
        );
        assert!(matches!(result, Err(SignerError::AddressMismatch { .. })));
        // Only the address query reached the device
        assert_eq!(device.apdus().len(), 1);
        assert_eq!(device.close_count(), 1);
    }

    #[test]
    fn test_device_error_closes_session() {
        let device = FakeLedger::new(Address::repeat_byte(0xab)).failing_sign();
        let signer = LedgerSigner::new(Box::new(FakeLedgerConnector::new(device.clone())), 0);

        let result = signer.sign_typed_data_hash(
            Address::repeat_byte(0xab),
            &B256::ZERO,
            &B256::ZERO,
        );
        assert!(matches!(result, Err(SignerError::DeviceIo(_))));
        assert_eq!(device.close_count(), 1);
    }

    #[test]
    fn test_split_command() {
        let (header, data) = split_command(&[0xE0, 0x02, 0x01, 0x00, 2, 0xaa, 0xbb]).unwrap();
        assert_eq!(header, [0xE0, 0x02, 0x01, 0x00]);
        assert_eq!(data, &[0xaa, 0xbb]);

        assert!(split_command(&[0xE0, 0x02, 0x01]).is_err());
        // Lc disagrees with the payload length
        assert!(split_command(&[0xE0, 0x02, 0x01, 0x00, 3, 0xaa]).is_err());
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(SW_OK).is_ok());
        assert!(matches!(check_status(0x6985), Err(SignerError::DeviceIo(_))));
    }

    #[test]
    fn test_index_out_of_range_never_connects() {
        let device = FakeLedger::new(Address::repeat_byte(0xab));
        let signer = LedgerSigner::new(
            Box::new(FakeLedgerConnector::new(device.clone())),
            crate::signer::derivation::HARDENED,
        );

        assert!(matches!(
            signer.verify_address(Address::repeat_byte(0xab)),
            Err(SignerError::InvalidPath(_))
        ));
        assert!(device.apdus().is_empty());
        assert_eq!(device.close_count(), 0);
    }

    #[test]
    fn test_oversized_response_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut len = [0u8; 4];
            stream.read_exact(&mut len).unwrap();
            let mut apdu = vec![0u8; u32::from_be_bytes(len) as usize];
            stream.read_exact(&mut apdu).unwrap();

            // Claim a 4 GiB body and send nothing else
            stream.write_all(&u32::MAX.to_be_bytes()).unwrap();
        });

        let mut transport = TcpApduConnector::new(address.to_string()).connect().unwrap();
        match transport.exchange(&[0xE0, 0x02, 0, 0, 0]) {
            Err(SignerError::DeviceIo(message)) => assert!(message.contains("exceeds")),
            other => panic!("expected oversized response error, got {:?}", other),
        }
        server.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpApduConnector::new(address.to_string()).connect();
        assert!(matches!(result, Err(SignerError::DeviceCommunication(_))));
    }

    #[test]
    fn test_tcp_framing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for sw in [[0x90, 0x00], [0x6a, 0x80]] {
                let mut len = [0u8; 4];
                stream.read_exact(&mut len).unwrap();
                let mut apdu = vec![0u8; u32::from_be_bytes(len) as usize];
                stream.read_exact(&mut apdu).unwrap();

                // Echo the instruction byte back as data
                let mut reply = 1u32.to_be_bytes().to_vec();
                reply.push(apdu[1]);
                reply.extend_from_slice(&sw);
                stream.write_all(&reply).unwrap();
            }
        });

        let mut transport = TcpApduConnector::new(address.to_string()).connect().unwrap();
        assert_eq!(transport.exchange(&[0xE0, 0x42, 0, 0, 0]).unwrap(), vec![0x42]);
        assert!(matches!(
            transport.exchange(&[0xE0, 0x43, 0, 0, 0]),
            Err(SignerError::DeviceIo(_))
        ));
        transport.close();
        server.join().unwrap();

        assert!(matches!(
            transport.exchange(&[0xE0, 0x44, 0, 0, 0]),
            Err(SignerError::DeviceCommunication(_))
        ));
    }
}
