//! The directed connectivity matrix between fixture servers (§4.B).

/// The state of a directed edge `i -> j` in the connectivity matrix.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// Sends succeed locally and messages are delivered.
    Connected,
    /// Sends fail synchronously with [`crate::FixtureError::NoConnection`].
    Disconnected,
    /// Sends succeed locally (the send-callback fires) but delivery is
    /// silently dropped.
    Saturated,
}

/// A directed N×N relation between servers, defaulting to fully connected.
///
/// The matrix is directed on purpose: tests rely on asymmetric partitions
/// (see scenario S6, `saturate(1, 0)` without the reverse edge). Callers that
/// want a symmetric partition must set both directions explicitly.
#[derive(Debug, Clone)]
pub struct Connectivity {
    n: usize,
    links: Vec<LinkState>,
}

impl Connectivity {
    /// Build a fully-connected matrix for `n` servers.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            links: vec![LinkState::Connected; n * n],
        }
    }

    /// Grow the matrix to `n` servers, connecting the new row/column to
    /// every existing server. Used by `Fixture::grow`.
    pub fn grow_to(&mut self, n: usize) {
        assert!(n >= self.n, "connectivity matrix cannot shrink");
        let mut links = vec![LinkState::Connected; n * n];
        for i in 0..self.n {
            for j in 0..self.n {
                links[i * n + j] = self.links[i * self.n + j];
            }
        }
        self.links = links;
        self.n = n;
    }

    fn index(&self, i: usize, j: usize) -> usize {
        assert!(i < self.n && j < self.n, "server index out of range");
        i * self.n + j
    }

    pub fn state(&self, i: usize, j: usize) -> LinkState {
        self.links[self.index(i, j)]
    }

    pub fn disconnect(&mut self, i: usize, j: usize) {
        let idx = self.index(i, j);
        self.links[idx] = LinkState::Disconnected;
    }

    pub fn reconnect(&mut self, i: usize, j: usize) {
        let idx = self.index(i, j);
        self.links[idx] = LinkState::Connected;
    }

    pub fn saturate(&mut self, i: usize, j: usize) {
        let idx = self.index(i, j);
        self.links[idx] = LinkState::Saturated;
    }

    pub fn desaturate(&mut self, i: usize, j: usize) {
        let idx = self.index(i, j);
        self.links[idx] = LinkState::Connected;
    }

    pub fn saturated(&self, i: usize, j: usize) -> bool {
        self.state(i, j) == LinkState::Saturated
    }

    /// Whether a message admitted on this edge is delivered at all (either
    /// `Connected` or `Saturated` allow local send success; only
    /// `Connected` allows actual delivery).
    pub fn allows_delivery(&self, i: usize, j: usize) -> bool {
        self.state(i, j) == LinkState::Connected
    }

    pub fn allows_send(&self, i: usize, j: usize) -> bool {
        self.state(i, j) != LinkState::Disconnected
    }
}
