//! LED color arbitration
//!
//! Rules are tried in order and the first one that yields a color wins:
//! blink, manual override, program+preview (amber), program (red),
//! preview (green), and finally black.

use tally_core::Rgb;

use crate::state::NodeState;

type Rule = fn(&NodeState) -> Option<Rgb>;

static RULES: [(&str, Rule); 6] = [
    ("blink", blink),
    ("override", color_override),
    ("program+preview", program_and_preview),
    ("program", program),
    ("preview", preview),
    ("idle", idle),
];

fn blink(s: &NodeState) -> Option<Rgb> {
    let blink = s.blink.filter(|b| b.enabled)?;
    Some(if blink.phase_on { blink.color } else { Rgb::BLACK })
}

fn color_override(s: &NodeState) -> Option<Rgb> {
    s.color_override
}

fn program_and_preview(s: &NodeState) -> Option<Rgb> {
    (s.is_program() && s.is_preview()).then_some(Rgb::AMBER)
}

fn program(s: &NodeState) -> Option<Rgb> {
    s.is_program().then_some(Rgb::RED)
}

fn preview(s: &NodeState) -> Option<Rgb> {
    s.is_preview().then_some(Rgb::GREEN)
}

fn idle(_: &NodeState) -> Option<Rgb> {
    Some(Rgb::BLACK)
}

/// Name of the rule that currently decides the color
pub fn winning_rule(state: &NodeState) -> &'static str {
    RULES
        .iter()
        .find(|(_, rule)| rule(state).is_some())
        .map_or("idle", |(name, _)| *name)
}

/// Color before brightness scaling
pub fn resolve(state: &NodeState) -> Rgb {
    RULES
        .iter()
        .find_map(|(_, rule)| rule(state))
        .unwrap_or(Rgb::BLACK)
}

/// Color as driven onto the LED
pub fn output(state: &NodeState) -> Rgb {
    resolve(state).scaled(state.rgb_brightness)
}
