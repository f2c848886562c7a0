//! Countdown indicator state
//!
//! The indicator is the status line the daemon logs on a cadence. It is shown
//! only while the user wants it and the report is not full-screen.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    visible: bool,
    fullscreen: bool,
}

impl Default for Indicator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Indicator {
    pub fn new(visible: bool) -> Self {
        Self {
            visible,
            fullscreen: false,
        }
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn displayed(&self) -> bool {
        self.visible && !self.fullscreen
    }

    /// Flip the user's visibility choice and return the new value
    pub fn toggle(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    /// Record the observed full-screen state; true if `displayed()` changed
    pub fn set_fullscreen(&mut self, fullscreen: bool) -> bool {
        let before = self.displayed();
        self.fullscreen = fullscreen;
        before != self.displayed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_twice_restores_display() {
        let mut indicator = Indicator::new(true);
        assert!(!indicator.toggle());
        assert!(!indicator.displayed());
        assert!(indicator.toggle());
        assert!(indicator.displayed());
    }

    #[test]
    fn full_screen_hides_without_touching_preference() {
        let mut indicator = Indicator::default();

        assert!(indicator.set_fullscreen(true));
        assert!(!indicator.displayed());
        assert!(indicator.visible());

        assert!(!indicator.set_fullscreen(true));
        assert!(indicator.set_fullscreen(false));
        assert!(indicator.displayed());
    }

    #[test]
    fn hidden_indicator_ignores_full_screen_changes() {
        let mut indicator = Indicator::new(false);
        assert!(!indicator.set_fullscreen(true));
        assert!(!indicator.set_fullscreen(false));
        assert!(!indicator.displayed());
    }

    #[test]
    fn toggle_while_full_screen_stays_hidden() {
        let mut indicator = Indicator::new(false);
        indicator.set_fullscreen(true);
        indicator.toggle();
        assert!(indicator.visible());
        assert!(!indicator.displayed());
    }
}
