pub mod initializer;
pub mod layer;

/// The view of the surrounding network that a layer sees during one pass.
#[derive(Debug)]
pub struct NetState<'a, F> {
    /// Output of the previous layer, `(batch, c, h, w)`.
    pub input: &'a [F],
    /// Gradient buffer of the previous layer, absent for the first layer.
    pub delta: Option<&'a mut [F]>,
    /// Scratch shared by every layer, at least as large as the largest `workspace_len`.
    pub workspace: &'a mut [F],
    pub train: bool,
}

impl<'a, F> NetState<'a, F> {
    pub fn new(input: &'a [F], workspace: &'a mut [F]) -> Self {
        NetState {
            input,
            delta: None,
            workspace,
            train: false,
        }
    }

    pub fn with_delta(mut self, delta: &'a mut [F]) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn training(mut self, train: bool) -> Self {
        self.train = train;
        self
    }
}
