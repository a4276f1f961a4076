//! Modbus TCP framing
//!
//! MBAP header parsing, request PDU decoding into typed requests and
//! response/exception PDU encoding. Limits follow the official
//! specification: the PDU is capped at 253 bytes (inherited from the RS485
//! ADU limit of 256 bytes), which bounds the per-request register and coil
//! quantities below.

use crate::core::value::DataArea;

/// Modbus MBAP header length for TCP
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2) + Unit ID(1) = 7 bytes
pub const MBAP_HEADER_LEN: usize = 7;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU)
pub const MAX_MBAP_LENGTH: u16 = 1 + MAX_PDU_SIZE as u16;

/// Maximum number of coils for FC01/FC02 reads
pub const MAX_READ_BITS: u16 = 2000;

/// Maximum number of registers for FC03/FC04 reads
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of coils for FC15 writes
pub const MAX_WRITE_BITS: u16 = 1968;

/// Maximum number of registers for FC16 writes
pub const MAX_WRITE_REGISTERS: u16 = 123;

// Function codes served by the simulator
pub mod function {
    pub const READ_COILS: u8 = 0x01;
    pub const READ_DISCRETE_INPUTS: u8 = 0x02;
    pub const READ_HOLDING_REGISTERS: u8 = 0x03;
    pub const READ_INPUT_REGISTERS: u8 = 0x04;
    pub const WRITE_SINGLE_COIL: u8 = 0x05;
    pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
    pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
    pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
}

/// Modbus exception codes returned to the requesting master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    GatewayTargetFailedToRespond = 0x0B,
}

impl ExceptionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => "ILLEGAL_FUNCTION",
            ExceptionCode::IllegalDataAddress => "ILLEGAL_DATA_ADDRESS",
            ExceptionCode::IllegalDataValue => "ILLEGAL_DATA_VALUE",
            ExceptionCode::ServerDeviceFailure => "SERVER_DEVICE_FAILURE",
            ExceptionCode::GatewayTargetFailedToRespond => "GATEWAY_TARGET_FAILED_TO_RESPOND",
        }
    }
}

/// Parsed MBAP header of one request frame
#[derive(Debug, Clone, Copy)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Remaining frame bytes after the length field: unit id + PDU
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    /// Parse the fixed 7-byte header
    pub fn parse(buf: &[u8; MBAP_HEADER_LEN]) -> Self {
        Self {
            transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
            protocol_id: u16::from_be_bytes([buf[2], buf[3]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
            unit_id: buf[6],
        }
    }

    /// A header is framable when it announces protocol 0 and a PDU of at
    /// least a function code and at most the specification maximum.
    pub fn is_valid(&self) -> bool {
        self.protocol_id == 0 && self.length >= 2 && self.length <= MAX_MBAP_LENGTH
    }
}

/// One decoded request PDU
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// FC01 / FC02
    ReadBits {
        area: DataArea,
        address: u16,
        quantity: u16,
    },
    /// FC03 / FC04
    ReadRegisters {
        area: DataArea,
        address: u16,
        quantity: u16,
    },
    /// FC05
    WriteSingleCoil { address: u16, value: bool },
    /// FC06
    WriteSingleRegister { address: u16, value: u16 },
    /// FC15
    WriteMultipleCoils { address: u16, bits: Vec<bool> },
    /// FC16
    WriteMultipleRegisters { address: u16, words: Vec<u16> },
}

fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes([
        *data.get(offset)?,
        *data.get(offset + 1)?,
    ]))
}

/// Decode a request PDU body (`data` excludes the function code).
///
/// Unknown function codes map to `IllegalFunction`; malformed bodies and
/// quantities beyond the Modbus limits map to `IllegalDataValue`.
pub fn parse_request(function: u8, data: &[u8]) -> Result<Request, ExceptionCode> {
    match function {
        function::READ_COILS | function::READ_DISCRETE_INPUTS => {
            let address = be_u16(data, 0).ok_or(ExceptionCode::IllegalDataValue)?;
            let quantity = be_u16(data, 2).ok_or(ExceptionCode::IllegalDataValue)?;
            if quantity == 0 || quantity > MAX_READ_BITS {
                return Err(ExceptionCode::IllegalDataValue);
            }
            let area = if function == function::READ_COILS {
                DataArea::Coil
            } else {
                DataArea::DiscreteInput
            };
            Ok(Request::ReadBits {
                area,
                address,
                quantity,
            })
        },
        function::READ_HOLDING_REGISTERS | function::READ_INPUT_REGISTERS => {
            let address = be_u16(data, 0).ok_or(ExceptionCode::IllegalDataValue)?;
            let quantity = be_u16(data, 2).ok_or(ExceptionCode::IllegalDataValue)?;
            if quantity == 0 || quantity > MAX_READ_REGISTERS {
                return Err(ExceptionCode::IllegalDataValue);
            }
            let area = if function == function::READ_HOLDING_REGISTERS {
                DataArea::HoldingRegister
            } else {
                DataArea::InputRegister
            };
            Ok(Request::ReadRegisters {
                area,
                address,
                quantity,
            })
        },
        function::WRITE_SINGLE_COIL => {
            let address = be_u16(data, 0).ok_or(ExceptionCode::IllegalDataValue)?;
            let raw = be_u16(data, 2).ok_or(ExceptionCode::IllegalDataValue)?;
            // FC05 accepts exactly 0xFF00 (on) and 0x0000 (off)
            let value = match raw {
                0xFF00 => true,
                0x0000 => false,
                _ => return Err(ExceptionCode::IllegalDataValue),
            };
            Ok(Request::WriteSingleCoil { address, value })
        },
        function::WRITE_SINGLE_REGISTER => {
            let address = be_u16(data, 0).ok_or(ExceptionCode::IllegalDataValue)?;
            let value = be_u16(data, 2).ok_or(ExceptionCode::IllegalDataValue)?;
            Ok(Request::WriteSingleRegister { address, value })
        },
        function::WRITE_MULTIPLE_COILS => {
            let address = be_u16(data, 0).ok_or(ExceptionCode::IllegalDataValue)?;
            let quantity = be_u16(data, 2).ok_or(ExceptionCode::IllegalDataValue)?;
            let byte_count = *data.get(4).ok_or(ExceptionCode::IllegalDataValue)? as usize;

            if quantity == 0
                || quantity > MAX_WRITE_BITS
                || byte_count != quantity.div_ceil(8) as usize
                || data.len() < 5 + byte_count
            {
                return Err(ExceptionCode::IllegalDataValue);
            }

            let mut bits = Vec::with_capacity(quantity as usize);
            for i in 0..quantity {
                let byte = data[5 + (i / 8) as usize];
                bits.push((byte >> (i % 8)) & 1 == 1);
            }
            Ok(Request::WriteMultipleCoils { address, bits })
        },
        function::WRITE_MULTIPLE_REGISTERS => {
            let address = be_u16(data, 0).ok_or(ExceptionCode::IllegalDataValue)?;
            let quantity = be_u16(data, 2).ok_or(ExceptionCode::IllegalDataValue)?;
            let byte_count = *data.get(4).ok_or(ExceptionCode::IllegalDataValue)? as usize;

            if quantity == 0
                || quantity > MAX_WRITE_REGISTERS
                || byte_count != quantity as usize * 2
                || data.len() < 5 + byte_count
            {
                return Err(ExceptionCode::IllegalDataValue);
            }

            let mut words = Vec::with_capacity(quantity as usize);
            for i in 0..quantity as usize {
                words.push(u16::from_be_bytes([data[5 + i * 2], data[6 + i * 2]]));
            }
            Ok(Request::WriteMultipleRegisters { address, words })
        },
        _ => Err(ExceptionCode::IllegalFunction),
    }
}

/// FC01/FC02 response: byte count followed by LSB-first packed bits
pub fn bits_response(function: u8, bits: &[bool]) -> Vec<u8> {
    let byte_count = bits.len().div_ceil(8);
    let mut pdu = Vec::with_capacity(2 + byte_count);
    pdu.push(function);
    pdu.push(byte_count as u8);

    let mut current = 0u8;
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            current |= 1 << (i % 8);
        }
        if i % 8 == 7 || i == bits.len() - 1 {
            pdu.push(current);
            current = 0;
        }
    }
    pdu
}

/// FC03/FC04 response: byte count followed by big-endian register words
pub fn registers_response(function: u8, words: &[u16]) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(2 + words.len() * 2);
    pdu.push(function);
    pdu.push((words.len() * 2) as u8);
    for word in words {
        pdu.extend_from_slice(&word.to_be_bytes());
    }
    pdu
}

/// FC05/FC06/FC15/FC16 response: echo address and value/quantity
pub fn echo_response(function: u8, address: u16, value: u16) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5);
    pdu.push(function);
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&value.to_be_bytes());
    pdu
}

/// Exception response: function code with the error bit set, then the code
pub fn exception_pdu(function: u8, code: ExceptionCode) -> Vec<u8> {
    vec![function | 0x80, code as u8]
}

/// Wrap a response PDU in an MBAP header
pub fn build_adu(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut adu = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    adu.extend_from_slice(&transaction_id.to_be_bytes());
    adu.extend_from_slice(&[0x00, 0x00]); // Protocol ID (Modbus)
    adu.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
    adu.push(unit_id);
    adu.extend_from_slice(pdu);
    adu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let header = MbapHeader::parse(&[0x00, 0x2A, 0x00, 0x00, 0x00, 0x06, 0x11]);
        assert_eq!(header.transaction_id, 0x2A);
        assert_eq!(header.protocol_id, 0);
        assert_eq!(header.length, 6);
        assert_eq!(header.unit_id, 0x11);
        assert!(header.is_valid());

        let bad = MbapHeader::parse(&[0x00, 0x2A, 0x00, 0x01, 0x00, 0x06, 0x11]);
        assert!(!bad.is_valid());
    }

    #[test]
    fn test_parse_read_requests() {
        let req = parse_request(0x03, &[0x00, 0x10, 0x00, 0x02]).unwrap();
        assert_eq!(
            req,
            Request::ReadRegisters {
                area: DataArea::HoldingRegister,
                address: 0x10,
                quantity: 2,
            }
        );

        let req = parse_request(0x02, &[0x00, 0x00, 0x00, 0x08]).unwrap();
        assert!(matches!(
            req,
            Request::ReadBits {
                area: DataArea::DiscreteInput,
                quantity: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_quantity_limits_enforced() {
        assert_eq!(
            parse_request(0x03, &[0x00, 0x00, 0x00, 0x7E]).unwrap_err(),
            ExceptionCode::IllegalDataValue
        );
        assert_eq!(
            parse_request(0x01, &[0x00, 0x00, 0x00, 0x00]).unwrap_err(),
            ExceptionCode::IllegalDataValue
        );
    }

    #[test]
    fn test_fc05_payload_strictness() {
        let req = parse_request(0x05, &[0x00, 0x05, 0xFF, 0x00]).unwrap();
        assert_eq!(
            req,
            Request::WriteSingleCoil {
                address: 5,
                value: true,
            }
        );
        assert_eq!(
            parse_request(0x05, &[0x00, 0x05, 0x12, 0x34]).unwrap_err(),
            ExceptionCode::IllegalDataValue
        );
    }

    #[test]
    fn test_parse_write_multiple_coils() {
        // 10 coils: 0b11001101, 0b00000001
        let req = parse_request(0x0F, &[0x00, 0x00, 0x00, 0x0A, 0x02, 0xCD, 0x01]).unwrap();
        match req {
            Request::WriteMultipleCoils { address, bits } => {
                assert_eq!(address, 0);
                assert_eq!(bits.len(), 10);
                assert!(bits[0] && !bits[1] && bits[2] && bits[3]);
                assert!(bits[8] && !bits[9]);
            },
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_write_multiple_registers_byte_count_mismatch() {
        assert_eq!(
            parse_request(0x10, &[0x00, 0x00, 0x00, 0x02, 0x03, 0x00, 0x01, 0x00]).unwrap_err(),
            ExceptionCode::IllegalDataValue
        );
    }

    #[test]
    fn test_unknown_function_code() {
        assert_eq!(
            parse_request(0x2B, &[]).unwrap_err(),
            ExceptionCode::IllegalFunction
        );
    }

    #[test]
    fn test_bits_response_packing() {
        let pdu = bits_response(0x01, &[true, false, true, true]);
        assert_eq!(pdu, vec![0x01, 0x01, 0b0000_1101]);

        let bits: Vec<bool> = (0..9).map(|i| i % 2 == 0).collect();
        let pdu = bits_response(0x01, &bits);
        assert_eq!(pdu, vec![0x01, 0x02, 0b0101_0101, 0x01]);
    }

    #[test]
    fn test_adu_roundtrip_shape() {
        let pdu = registers_response(0x03, &[0x1234]);
        let adu = build_adu(7, 1, &pdu);
        assert_eq!(adu, vec![0x00, 0x07, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x12, 0x34]);
    }

    #[test]
    fn test_exception_pdu_sets_error_bit() {
        assert_eq!(
            exception_pdu(0x03, ExceptionCode::IllegalDataAddress),
            vec![0x83, 0x02]
        );
    }
}
