//! Response delivery contract.
//!
//! The transport hands the response body to a [`ResponseHandler`] one
//! [`ResponseFragment`] at a time, in arrival order. A handler must accept
//! empty fragments and must only rely on [`ResponseFragment::status_code`]
//! once the final fragment arrives.

/// Whether more fragments follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finality {
    More,
    Final,
}

/// One chunk of a response delivered to a [`ResponseHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFragment<'a> {
    /// HTTP status code, always set on the final fragment.
    pub status_code: Option<u16>,
    /// Body bytes of this fragment, possibly empty.
    pub body: &'a [u8],
    pub finality: Finality,
    /// Declared `Content-Length` of the whole body, when the server sent one.
    pub content_length: Option<usize>,
}

impl<'a> ResponseFragment<'a> {
    #[must_use]
    pub fn new(status_code: Option<u16>, body: &'a [u8], finality: Finality) -> Self {
        Self {
            status_code,
            body,
            finality,
            content_length: None,
        }
    }

    #[must_use]
    pub fn with_content_length(mut self, length: Option<usize>) -> Self {
        self.content_length = length;
        self
    }

    #[must_use]
    pub fn is_final(&self) -> bool {
        self.finality == Finality::Final
    }
}

/// What the transport should do after a fragment was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    Continue,
    /// Stop the exchange; `execute` fails with `TransportError::Aborted`.
    Abort,
}

/// Receives the fragments of one response.
pub trait ResponseHandler: Send {
    fn on_fragment(&mut self, fragment: &ResponseFragment<'_>) -> HandlerAction;
}

impl<F> ResponseHandler for F
where
    F: FnMut(&ResponseFragment<'_>) -> HandlerAction + Send,
{
    fn on_fragment(&mut self, fragment: &ResponseFragment<'_>) -> HandlerAction {
        self(fragment)
    }
}

/// Handler that drops every fragment. Used when no handler was configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardHandler;

impl ResponseHandler for DiscardHandler {
    fn on_fragment(&mut self, _fragment: &ResponseFragment<'_>) -> HandlerAction {
        HandlerAction::Continue
    }
}

/// Handler that keeps a copy of every fragment, for inspection after
/// `execute` returns.
#[derive(Debug, Default, Clone)]
pub struct CollectingHandler {
    fragments: std::sync::Arc<std::sync::Mutex<Vec<OwnedFragment>>>,
}

/// Owned copy of a [`ResponseFragment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFragment {
    pub status_code: Option<u16>,
    pub body: Vec<u8>,
    pub finality: Finality,
}

impl CollectingHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragments received so far.
    #[must_use]
    pub fn fragments(&self) -> Vec<OwnedFragment> {
        self.fragments
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Concatenated body of every fragment received so far.
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        self.fragments()
            .into_iter()
            .flat_map(|fragment| fragment.body)
            .collect()
    }
}

impl ResponseHandler for CollectingHandler {
    fn on_fragment(&mut self, fragment: &ResponseFragment<'_>) -> HandlerAction {
        self.fragments
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(OwnedFragment {
                status_code: fragment.status_code,
                body: fragment.body.to_vec(),
                finality: fragment.finality,
            });
        HandlerAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_handler() {
        let mut seen = 0usize;
        {
            let mut handler = |fragment: &ResponseFragment<'_>| {
                seen += fragment.body.len();
                HandlerAction::Continue
            };
            let fragment = ResponseFragment::new(Some(200), b"abc", Finality::Final);
            assert_eq!(handler.on_fragment(&fragment), HandlerAction::Continue);
        }
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_collecting_handler_clones_share_storage() {
        let collector = CollectingHandler::new();
        let mut handler = collector.clone();

        handler.on_fragment(&ResponseFragment::new(None, b"he", Finality::More));
        handler.on_fragment(&ResponseFragment::new(Some(200), b"llo", Finality::Final));

        let fragments = collector.fragments();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[1].status_code, Some(200));
        assert_eq!(collector.body(), b"hello");
    }
}
