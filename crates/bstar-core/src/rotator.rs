//! Round-robin over the reliable client's server endpoints.

use crate::client::ClientError;

#[derive(Debug, Clone)]
pub struct EndpointRotator {
    endpoints: Vec<String>,
    cursor: usize,
}

impl EndpointRotator {
    pub fn new<I, S>(endpoints: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<String> = endpoints.into_iter().map(Into::into).collect();
        if endpoints.is_empty() {
            return Err(ClientError::NoEndpoints);
        }
        Ok(Self {
            endpoints,
            cursor: 0,
        })
    }

    /// The endpoint at the cursor; advances the cursor, wrapping around.
    pub fn next_endpoint(&mut self) -> &str {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        &self.endpoints[index]
    }
}

/// Never ends.
impl Iterator for EndpointRotator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        Some(self.next_endpoint().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotates_in_order_and_wraps() {
        let rotator = EndpointRotator::new(["a", "b", "c"]).unwrap();
        let seen: Vec<String> = rotator.take(7).collect();
        assert_eq!(seen, ["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn test_single_endpoint_repeats() {
        let mut rotator = EndpointRotator::new(["only"]).unwrap();
        assert_eq!(rotator.next_endpoint(), "only");
        assert_eq!(rotator.next_endpoint(), "only");
    }

    #[test]
    fn test_empty_is_rejected() {
        let err = EndpointRotator::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ClientError::NoEndpoints));
    }
}
