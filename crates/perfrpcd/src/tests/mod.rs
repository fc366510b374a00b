//! Test suites for the perfrpc daemon lifecycle.

mod dispatch_behaviour;
mod support;
mod unit;
