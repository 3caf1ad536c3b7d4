//! Routing-key construction (spec §3, testable property: composite
//! partition keys are serialized as `len(bᵢ)` (2 bytes, big-endian) followed
//! by `bᵢ` followed by a zero byte, concatenated per component; a
//! single-component key is just its raw bytes, unwrapped).

use crate::error::{DriverError, Result};

pub fn build_routing_key(components: &[Vec<u8>]) -> Result<Vec<u8>> {
    match components {
        [] => Err(DriverError::InvalidArgument(
            "routing key requires at least one component".into(),
        )),
        [only] => Ok(only.clone()),
        many => {
            let mut out = Vec::new();
            for component in many {
                if component.len() > u16::MAX as usize {
                    return Err(DriverError::InvalidArgument(format!(
                        "routing key component of {} bytes exceeds the 16-bit length prefix",
                        component.len()
                    )));
                }
                out.extend_from_slice(&(component.len() as u16).to_be_bytes());
                out.extend_from_slice(component);
                out.push(0);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_component_key_is_unwrapped() {
        let key = build_routing_key(&[vec![1, 2, 3]]).unwrap();
        assert_eq!(key, vec![1, 2, 3]);
    }

    #[test]
    fn composite_key_is_length_prefixed_and_zero_terminated() {
        let key = build_routing_key(&[vec![0xAA], vec![0xBB, 0xCC]]).unwrap();
        assert_eq!(
            key,
            vec![0x00, 0x01, 0xAA, 0x00, 0x00, 0x02, 0xBB, 0xCC, 0x00]
        );
    }

    #[test]
    fn empty_components_is_an_error() {
        assert!(build_routing_key(&[]).is_err());
    }
}
