use crate::Error;

/// TLS 1.3 KeyUpdate (RFC 8446 Section 4.6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUpdate {
    UpdateNotRequested,
    UpdateRequested,
}

impl KeyUpdate {
    pub fn new(update_requested: bool) -> Self {
        if update_requested {
            KeyUpdate::UpdateRequested
        } else {
            KeyUpdate::UpdateNotRequested
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            KeyUpdate::UpdateNotRequested => 0,
            KeyUpdate::UpdateRequested => 1,
        }
    }

    pub fn decode(body: &[u8]) -> Result<KeyUpdate, Error> {
        match body {
            [0] => Ok(KeyUpdate::UpdateNotRequested),
            [1] => Ok(KeyUpdate::UpdateRequested),
            [other] => Err(Error::IllegalParameter(format!("key update request {}", other))),
            _ => Err(Error::DecodeError("KeyUpdate length".into())),
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.as_u8());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode() {
        assert_eq!(KeyUpdate::decode(&[1]).unwrap(), KeyUpdate::UpdateRequested);
        assert!(matches!(
            KeyUpdate::decode(&[2]),
            Err(Error::IllegalParameter(_))
        ));
        assert!(matches!(
            KeyUpdate::decode(&[0, 0]),
            Err(Error::DecodeError(_))
        ));
    }
}
