use std::slice;

use http::HeaderValue;

/// The values stored under one header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HeaderValues {
    #[default]
    Empty,
    One(HeaderValue),
    Many(Vec<HeaderValue>),
}

impl HeaderValues {
    pub fn len(&self) -> usize {
        match self {
            HeaderValues::Empty => 0,
            HeaderValues::One(_) => 1,
            HeaderValues::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<&HeaderValue> {
        self.as_slice().first()
    }

    pub fn as_slice(&self) -> &[HeaderValue] {
        match self {
            HeaderValues::Empty => &[],
            HeaderValues::One(value) => slice::from_ref(value),
            HeaderValues::Many(values) => values,
        }
    }

    pub fn iter(&self) -> slice::Iter<'_, HeaderValue> {
        self.as_slice().iter()
    }

    pub fn push(&mut self, value: HeaderValue) {
        *self = match std::mem::take(self) {
            HeaderValues::Empty => HeaderValues::One(value),
            HeaderValues::One(first) => HeaderValues::Many(vec![first, value]),
            HeaderValues::Many(mut values) => {
                values.push(value);
                HeaderValues::Many(values)
            }
        };
    }

    /// Joins the values with `", "`.
    pub fn to_joined(&self) -> Option<HeaderValue> {
        match self {
            HeaderValues::Empty => None,
            HeaderValues::One(value) => Some(value.clone()),
            HeaderValues::Many(values) => {
                let mut joined = Vec::new();
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        joined.extend_from_slice(b", ");
                    }
                    joined.extend_from_slice(value.as_bytes());
                }
                HeaderValue::from_bytes(&joined).ok()
            }
        }
    }
}

impl From<HeaderValue> for HeaderValues {
    fn from(value: HeaderValue) -> Self {
        HeaderValues::One(value)
    }
}

impl<'a> IntoIterator for &'a HeaderValues {
    type Item = &'a HeaderValue;
    type IntoIter = slice::Iter<'a, HeaderValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_grows_from_empty() {
        let mut values = HeaderValues::default();
        assert!(values.is_empty());
        values.push(HeaderValue::from_static("a"));
        assert!(matches!(values, HeaderValues::One(_)));
        values.push(HeaderValue::from_static("b"));
        values.push(HeaderValue::from_static("c"));
        assert_eq!(values.len(), 3);
        assert_eq!(values.first(), Some(&HeaderValue::from_static("a")));
        assert_eq!(values.to_joined(), Some(HeaderValue::from_static("a, b, c")));
    }
}
