use crate::nfs::NfsRequest;

/// Requests gathered since the last refresh.
///
/// The event loop owns the live collector; on every refresh it calls
/// [`Collector::take`] and hands the old contents to the aggregator. The
/// returned collector is never written to again.
#[derive(Debug, Default)]
pub struct Collector {
    requests: Vec<NfsRequest>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: NfsRequest) {
        self.requests.push(request);
    }

    /// Swap in an empty collector and return everything gathered so far.
    pub fn take(&mut self) -> Collector {
        std::mem::take(self)
    }

    pub fn as_slice(&self) -> &[NfsRequest] {
        &self.requests
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NfsRequest> {
        self.requests.iter()
    }

    pub fn into_vec(self) -> Vec<NfsRequest> {
        self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
