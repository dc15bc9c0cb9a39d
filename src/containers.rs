//! Master/details layout state machine.
//!
//! The owner sets a [`NavigationState`]; the layout reacts by showing,
//! hiding or animating the two panels. Whether two columns fit is a
//! property of the terminal, passed in separately, and a change re-applies
//! the current state.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::app::FlaxfeedError;

pub const ANIMATION_DURATION: Duration = Duration::from_millis(250);
/// Details alpha when the slide-in starts.
pub const DETAILS_ENTER_ALPHA: f32 = 0.4;
/// Vertical offset of a sliding panel, as a fraction of its height.
pub const SLIDE_OFFSET: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationState {
    SingleColumnMaster,
    SingleColumnDetails,
    TwoColumnsEmpty,
    TwoColumnsWithDetails,
}

impl NavigationState {
    pub fn name(self) -> &'static str {
        match self {
            NavigationState::SingleColumnMaster => "SINGLE_COLUMN_MASTER",
            NavigationState::SingleColumnDetails => "SINGLE_COLUMN_DETAILS",
            NavigationState::TwoColumnsEmpty => "TWO_COLUMNS_EMPTY",
            NavigationState::TwoColumnsWithDetails => "TWO_COLUMNS_WITH_DETAILS",
        }
    }

    /// State to use when nothing valid was saved.
    pub fn fallback(two_columns: bool) -> Self {
        if two_columns {
            NavigationState::TwoColumnsEmpty
        } else {
            NavigationState::SingleColumnMaster
        }
    }

    /// Parse a saved name, falling back with a warning when it is unknown.
    pub fn restore(name: &str, two_columns: bool) -> Self {
        name.parse().unwrap_or_else(|e| {
            warn!("{}, using default layout", e);
            Self::fallback(two_columns)
        })
    }

    pub fn has_details(self) -> bool {
        matches!(
            self,
            NavigationState::SingleColumnDetails | NavigationState::TwoColumnsWithDetails
        )
    }
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NavigationState {
    type Err = FlaxfeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SINGLE_COLUMN_MASTER" => Ok(NavigationState::SingleColumnMaster),
            "SINGLE_COLUMN_DETAILS" => Ok(NavigationState::SingleColumnDetails),
            "TWO_COLUMNS_EMPTY" => Ok(NavigationState::TwoColumnsEmpty),
            "TWO_COLUMNS_WITH_DETAILS" => Ok(NavigationState::TwoColumnsWithDetails),
            other => Err(FlaxfeedError::InvalidNavigationState(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Panel {
    pub visible: bool,
    pub alpha: f32,
    /// Downward offset as a fraction of the panel height.
    pub translation: f32,
}

impl Panel {
    fn shown() -> Self {
        Self {
            visible: true,
            alpha: 1.0,
            translation: 0.0,
        }
    }

    fn hidden() -> Self {
        Self {
            visible: false,
            ..Self::shown()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Decelerate,
    Accelerate,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Decelerate => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::Accelerate => t * t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnimationEnd {
    HideDetails,
    HideMaster,
}

#[derive(Debug, Clone, Copy)]
struct Animation {
    from: (f32, f32),
    to: (f32, f32),
    easing: Easing,
    started: Instant,
    end: AnimationEnd,
}

impl Animation {
    fn progress(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / ANIMATION_DURATION.as_secs_f32()).min(1.0)
    }
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

#[derive(Debug, Clone)]
pub struct ContainersLayout {
    state: NavigationState,
    two_columns: bool,
    column_width: u16,
    master: Panel,
    details: Panel,
    /// `None` means full width.
    master_width: Option<u16>,
    details_margin: u16,
    animation: Option<Animation>,
}

impl ContainersLayout {
    /// Layout in `state` with no animation pending. `column_width` is the
    /// master width used in two-column mode.
    pub fn new(state: NavigationState, two_columns: bool, column_width: u16, now: Instant) -> Self {
        let mut layout = Self {
            state,
            two_columns,
            column_width,
            master: Panel::shown(),
            details: Panel::hidden(),
            master_width: None,
            details_margin: 0,
            animation: None,
        };
        layout.apply(now);
        layout.finish();
        layout
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn two_columns(&self) -> bool {
        self.two_columns
    }

    pub fn master(&self) -> Panel {
        self.master
    }

    pub fn details(&self) -> Panel {
        self.details
    }

    pub fn master_width(&self) -> Option<u16> {
        self.master_width
    }

    pub fn details_margin(&self) -> u16 {
        self.details_margin
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Name to store in the session.
    pub fn save(&self) -> &'static str {
        self.state.name()
    }

    pub fn set_state(&mut self, state: NavigationState, now: Instant) {
        debug!("Layout {} -> {}", self.state, state);
        self.state = state;
        self.apply(now);
    }

    /// Re-applies the current state when the capability changes.
    pub fn set_two_columns(&mut self, two_columns: bool, now: Instant) {
        if self.two_columns == two_columns {
            return;
        }
        self.two_columns = two_columns;
        self.apply(now);
    }

    fn apply(&mut self, now: Instant) {
        self.animation = None;

        if self.two_columns {
            match self.state {
                NavigationState::SingleColumnMaster => {
                    self.master = Panel::shown();
                    self.details = Panel::hidden();
                    self.master_width = None;
                    self.details_margin = 0;
                }
                NavigationState::SingleColumnDetails => self.show_details_only(),
                NavigationState::TwoColumnsEmpty | NavigationState::TwoColumnsWithDetails => {
                    self.master = Panel::shown();
                    self.details = Panel::shown();
                    self.master_width = Some(self.column_width);
                    self.details_margin = self.column_width;
                }
            }
            return;
        }

        self.master_width = None;
        self.details_margin = 0;
        match self.state {
            NavigationState::SingleColumnMaster | NavigationState::TwoColumnsEmpty => {
                self.master = Panel::shown();
                self.animate_details_out(now);
            }
            NavigationState::SingleColumnDetails => self.show_details_only(),
            NavigationState::TwoColumnsWithDetails => {
                self.master = Panel::shown();
                self.details = Panel {
                    visible: true,
                    alpha: DETAILS_ENTER_ALPHA,
                    translation: SLIDE_OFFSET,
                };
                self.animation = Some(Animation {
                    from: (DETAILS_ENTER_ALPHA, SLIDE_OFFSET),
                    to: (1.0, 0.0),
                    easing: Easing::Decelerate,
                    started: now,
                    end: AnimationEnd::HideMaster,
                });
            }
        }
    }

    fn show_details_only(&mut self) {
        self.master = Panel::hidden();
        self.details = Panel::shown();
        self.master_width = None;
        self.details_margin = 0;
    }

    fn animate_details_out(&mut self, now: Instant) {
        if !self.details.visible {
            self.details = Panel::hidden();
            return;
        }
        self.animation = Some(Animation {
            from: (self.details.alpha, self.details.translation),
            to: (0.0, SLIDE_OFFSET),
            easing: Easing::Accelerate,
            started: now,
            end: AnimationEnd::HideDetails,
        });
    }

    /// Advance the running animation. Returns true if anything moved.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(animation) = self.animation else {
            return false;
        };
        let t = animation.progress(now);
        if t >= 1.0 {
            self.finish();
            return true;
        }
        let eased = animation.easing.apply(t);
        self.details.alpha = lerp(animation.from.0, animation.to.0, eased);
        self.details.translation = lerp(animation.from.1, animation.to.1, eased);
        true
    }

    /// Jump to the end of the running animation.
    pub fn finish(&mut self) {
        let Some(animation) = self.animation.take() else {
            return;
        };
        match animation.end {
            AnimationEnd::HideDetails => self.details = Panel::hidden(),
            AnimationEnd::HideMaster => {
                self.details.alpha = animation.to.0;
                self.details.translation = animation.to.1;
                self.master.visible = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTH: u16 = 40;

    fn single(state: NavigationState) -> (ContainersLayout, Instant) {
        let now = Instant::now();
        (ContainersLayout::new(state, false, WIDTH, now), now)
    }

    #[test]
    fn test_names_round_trip_and_reject_unknown() {
        for state in [
            NavigationState::SingleColumnMaster,
            NavigationState::SingleColumnDetails,
            NavigationState::TwoColumnsEmpty,
            NavigationState::TwoColumnsWithDetails,
        ] {
            assert_eq!(state.name().parse::<NavigationState>().unwrap(), state);
        }
        assert!(matches!(
            "SIDEWAYS".parse::<NavigationState>(),
            Err(FlaxfeedError::InvalidNavigationState(name)) if name == "SIDEWAYS"
        ));
    }

    #[test]
    fn test_restore_falls_back() {
        assert_eq!(
            NavigationState::restore("bogus", false),
            NavigationState::SingleColumnMaster
        );
        assert_eq!(
            NavigationState::restore("bogus", true),
            NavigationState::TwoColumnsEmpty
        );
        assert_eq!(
            NavigationState::restore("SINGLE_COLUMN_DETAILS", true),
            NavigationState::SingleColumnDetails
        );
    }

    #[test]
    fn test_easing_endpoints() {
        for easing in [Easing::Accelerate, Easing::Decelerate] {
            assert_eq!(easing.apply(0.0), 0.0);
            assert_eq!(easing.apply(1.0), 1.0);
        }
        assert!(Easing::Decelerate.apply(0.5) > 0.5);
        assert!(Easing::Accelerate.apply(0.5) < 0.5);
    }

    #[test]
    fn test_single_column_details_is_immediate() {
        let (mut layout, now) = single(NavigationState::SingleColumnMaster);
        layout.set_state(NavigationState::SingleColumnDetails, now);
        assert!(!layout.is_animating());
        assert!(!layout.master().visible);
        assert_eq!(layout.details(), Panel::shown());
    }

    #[test]
    fn test_details_slide_in_then_master_hides() {
        let (mut layout, now) = single(NavigationState::SingleColumnMaster);
        layout.set_state(NavigationState::TwoColumnsWithDetails, now);

        assert!(layout.master().visible);
        assert_eq!(layout.details().alpha, DETAILS_ENTER_ALPHA);
        assert_eq!(layout.details().translation, SLIDE_OFFSET);

        assert!(layout.tick(now + ANIMATION_DURATION / 2));
        let mid = layout.details();
        assert!(mid.alpha > DETAILS_ENTER_ALPHA && mid.alpha < 1.0);
        assert!(mid.translation > 0.0 && mid.translation < SLIDE_OFFSET);
        assert!(layout.master().visible);

        assert!(layout.tick(now + ANIMATION_DURATION));
        assert!(!layout.is_animating());
        assert!(!layout.master().visible);
        assert_eq!(layout.details(), Panel::shown());
        assert!(!layout.tick(now + ANIMATION_DURATION * 2));
    }

    #[test]
    fn test_out_animation_only_when_details_shown() {
        let (mut layout, now) = single(NavigationState::SingleColumnMaster);
        layout.set_state(NavigationState::TwoColumnsEmpty, now);
        assert!(!layout.is_animating());
        assert!(!layout.details().visible);

        layout.set_state(NavigationState::SingleColumnDetails, now);
        layout.set_state(NavigationState::SingleColumnMaster, now);
        assert!(layout.is_animating());
        assert!(layout.master().visible);
        layout.tick(now + ANIMATION_DURATION / 2);
        assert!(layout.details().alpha < 1.0);
        assert!(layout.details().visible);
    }

    #[test]
    fn test_round_trip_restores_initial_panels() {
        let (mut layout, now) = single(NavigationState::SingleColumnMaster);
        let (master, details) = (layout.master(), layout.details());

        layout.set_state(NavigationState::TwoColumnsWithDetails, now);
        layout.tick(now + ANIMATION_DURATION);
        layout.set_state(NavigationState::SingleColumnMaster, now + ANIMATION_DURATION);
        layout.tick(now + ANIMATION_DURATION * 2);

        assert_eq!(layout.master(), master);
        assert_eq!(layout.details(), details);

        // Interrupted halfway in: still ends up where it started.
        layout.set_state(NavigationState::TwoColumnsWithDetails, now);
        layout.tick(now + ANIMATION_DURATION / 3);
        layout.set_state(NavigationState::SingleColumnMaster, now + ANIMATION_DURATION / 3);
        layout.finish();
        assert_eq!(layout.master(), master);
        assert_eq!(layout.details(), details);
    }

    #[test]
    fn test_two_column_states() {
        let now = Instant::now();
        let mut layout =
            ContainersLayout::new(NavigationState::TwoColumnsEmpty, true, WIDTH, now);
        assert_eq!(layout.master_width(), Some(WIDTH));
        assert_eq!(layout.details_margin(), WIDTH);
        assert!(layout.master().visible && layout.details().visible);

        layout.set_state(NavigationState::SingleColumnMaster, now);
        assert!(!layout.is_animating());
        assert_eq!(layout.master_width(), None);
        assert!(!layout.details().visible);

        layout.set_state(NavigationState::TwoColumnsWithDetails, now);
        assert!(!layout.is_animating());
        assert_eq!(layout.details(), Panel::shown());
    }

    #[test]
    fn test_capability_change_reapplies_state() {
        let (mut layout, now) = single(NavigationState::TwoColumnsWithDetails);
        assert!(!layout.master().visible);

        layout.set_two_columns(true, now);
        assert!(layout.master().visible);
        assert_eq!(layout.master_width(), Some(WIDTH));

        layout.set_two_columns(false, now);
        assert!(layout.is_animating());
        layout.finish();
        assert!(!layout.master().visible);
        assert_eq!(layout.master_width(), None);
    }
}
