//! Outcome and session-state presentation.
//!
//! The controller reports to a [`Presenter`]: exactly one outcome per
//! completed capture, plus state-change notifications. Rendering is the
//! presenter's business; this module only ships a tracing-backed one and
//! the glue to fan notifications out to several presenters.

use crate::identification::IdentificationOutcome;
use crate::session::SessionEvent;
use std::rc::Rc;
use std::sync::Arc;

/// Receives what the capture session produces.
pub trait Presenter {
    /// The session entered a new user-visible state.
    fn session_changed(&self, event: &SessionEvent);

    /// A capture completed with `outcome`.
    fn outcome(&self, outcome: &IdentificationOutcome);
}

/// Presenter that writes everything to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn session_changed(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Idle => tracing::info!("Camera stopped"),
            SessionEvent::Active { profile, settings } => tracing::info!(
                profile = profile.index,
                resolution = %settings.resolution,
                facing = ?settings.facing,
                "Camera ready"
            ),
            SessionEvent::Error(error) => tracing::warn!(error = %error, "Camera error"),
        }
    }

    fn outcome(&self, outcome: &IdentificationOutcome) {
        match outcome {
            IdentificationOutcome::Success(book) => tracing::info!(
                title = %book.title,
                score = book.similarity_score,
                tier = %book.tier(),
                advice = book.tier().advisory(),
                "Book identified"
            ),
            IdentificationOutcome::UnknownBook { suggestion } => {
                tracing::info!(%suggestion, "Book not recognised")
            }
            IdentificationOutcome::Failure { message } => {
                tracing::warn!(%message, "Identification failed")
            }
        }
    }
}

impl<P: Presenter + ?Sized> Presenter for &P {
    fn session_changed(&self, event: &SessionEvent) {
        (**self).session_changed(event)
    }

    fn outcome(&self, outcome: &IdentificationOutcome) {
        (**self).outcome(outcome)
    }
}

impl<P: Presenter + ?Sized> Presenter for Rc<P> {
    fn session_changed(&self, event: &SessionEvent) {
        (**self).session_changed(event)
    }

    fn outcome(&self, outcome: &IdentificationOutcome) {
        (**self).outcome(outcome)
    }
}

impl<P: Presenter + ?Sized> Presenter for Arc<P> {
    fn session_changed(&self, event: &SessionEvent) {
        (**self).session_changed(event)
    }

    fn outcome(&self, outcome: &IdentificationOutcome) {
        (**self).outcome(outcome)
    }
}

impl<A: Presenter, B: Presenter> Presenter for (A, B) {
    fn session_changed(&self, event: &SessionEvent) {
        self.0.session_changed(event);
        self.1.session_changed(event);
    }

    fn outcome(&self, outcome: &IdentificationOutcome) {
        self.0.outcome(outcome);
        self.1.outcome(outcome);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    /// Records every notification in order.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingPresenter {
        pub(crate) events: RefCell<Vec<SessionEvent>>,
        pub(crate) outcomes: RefCell<Vec<IdentificationOutcome>>,
    }

    impl Presenter for RecordingPresenter {
        fn session_changed(&self, event: &SessionEvent) {
            self.events.borrow_mut().push(event.clone());
        }

        fn outcome(&self, outcome: &IdentificationOutcome) {
            self.outcomes.borrow_mut().push(outcome.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingPresenter;
    use super::*;

    #[test]
    fn test_pair_fans_out() {
        let first = Rc::new(RecordingPresenter::default());
        let second = Rc::new(RecordingPresenter::default());
        let both = (Rc::clone(&first), (Rc::clone(&second), LogPresenter));

        both.session_changed(&SessionEvent::Idle);
        both.outcome(&IdentificationOutcome::failure("offline"));

        for presenter in [&first, &second] {
            assert_eq!(*presenter.events.borrow(), vec![SessionEvent::Idle]);
            assert_eq!(
                *presenter.outcomes.borrow(),
                vec![IdentificationOutcome::failure("offline")]
            );
        }
    }
}
