//! Control bindings.
//!
//! One table maps every control-surface event to the command it posts. Value-carrying
//! controls parse the submitted text; empty or malformed submissions produce
//! `InvalidInput`, which surfaces drop without changing any state.

use crate::acquisition::JogDirection;
use crate::core::Color;
use crate::error::{AppResult, ScopeError};
use crate::messages::ScopeCommand;
use std::path::PathBuf;

/// How a control turns its submitted text into a command.
#[derive(Clone, Debug)]
pub enum Binding {
    /// Button: the value is ignored
    Action(ScopeCommand),
    /// Numeric field
    Number(fn(f64) -> ScopeCommand),
    /// Non-negative integer field
    Count(fn(u32) -> ScopeCommand),
    /// Free-text field
    Text(fn(String) -> ScopeCommand),
}

#[derive(Clone, Debug)]
pub struct ControlBinding {
    pub event: &'static str,
    pub binding: Binding,
    pub help: &'static str,
}

const fn bind(event: &'static str, binding: Binding, help: &'static str) -> ControlBinding {
    ControlBinding {
        event,
        binding,
        help,
    }
}

/// Every control the surfaces expose.
pub static BINDINGS: &[ControlBinding] = &[
    // Camera panel
    bind("find_and_init", Binding::Action(ScopeCommand::ConnectCamera), "connect and initialize the camera"),
    bind("start_stream", Binding::Action(ScopeCommand::StartStream), "start live streaming"),
    bind("stop_stream", Binding::Action(ScopeCommand::StopStream), "stop live streaming"),
    bind("exposure", Binding::Number(ScopeCommand::SetExposure), "exposure time (us)"),
    bind("gain", Binding::Number(ScopeCommand::SetGain), "gain (dB)"),
    bind("fps", Binding::Number(ScopeCommand::SetFrameRate), "frame rate (fps)"),
    // Acquisition
    bind("directory", Binding::Text(|dir| ScopeCommand::SetDirectory(PathBuf::from(dir))), "destination directory"),
    bind("name_format", Binding::Text(ScopeCommand::SetNameTemplate), "file name template, {date} is substituted"),
    bind("counter", Binding::Count(ScopeCommand::SetStartingCounter), "starting file counter"),
    bind("num_images", Binding::Count(ScopeCommand::SetNumImages), "number of images (time points)"),
    bind("num_avg", Binding::Count(ScopeCommand::SetNumToAverage), "frames averaged per image"),
    bind("interval", Binding::Number(ScopeCommand::SetInterval), "time between frames (s), overrides num_avg"),
    bind("capture", Binding::Action(ScopeCommand::CaptureSingleShot), "acquire num_images averaged frames"),
    bind("four_color", Binding::Action(ScopeCommand::CaptureFourColor), "acquire cycling r, y, g, b"),
    bind("defocus", Binding::Action(ScopeCommand::CaptureDefocus), "acquire a z-stack per time point"),
    // Stage panel
    bind("init_stage", Binding::Action(ScopeCommand::InitializeStage), "home all axes"),
    bind("up", Binding::Action(ScopeCommand::Jog(JogDirection::Up)), "jog x by -xy_step"),
    bind("down", Binding::Action(ScopeCommand::Jog(JogDirection::Down)), "jog x by +xy_step"),
    bind("left", Binding::Action(ScopeCommand::Jog(JogDirection::Left)), "jog y by -xy_step"),
    bind("right", Binding::Action(ScopeCommand::Jog(JogDirection::Right)), "jog y by +xy_step"),
    bind("z_up", Binding::Action(ScopeCommand::Jog(JogDirection::ZUp)), "jog z by -z_step"),
    bind("z_down", Binding::Action(ScopeCommand::Jog(JogDirection::ZDown)), "jog z by +z_step"),
    bind("xy_step", Binding::Number(ScopeCommand::SetXyStep), "xy step size (um), 0-5000"),
    bind("z_step", Binding::Number(ScopeCommand::SetZStep), "z step size (um), 0-5000"),
    bind("z_radius", Binding::Count(ScopeCommand::SetZRadius), "defocus steps on each side of focus"),
    bind("position", Binding::Action(ScopeCommand::ReadPosition), "read back the stage position"),
    // LEDs
    bind("led_r", Binding::Action(ScopeCommand::SetColor(Color::Red)), "red LED"),
    bind("led_g", Binding::Action(ScopeCommand::SetColor(Color::Green)), "green LED"),
    bind("led_b", Binding::Action(ScopeCommand::SetColor(Color::Blue)), "blue LED"),
    bind("led_off", Binding::Action(ScopeCommand::SetColor(Color::Off)), "all LEDs off"),
];

pub fn lookup(event: &str) -> Option<&'static ControlBinding> {
    BINDINGS.iter().find(|b| b.event == event)
}

fn invalid(event: &str, value: &str) -> ScopeError {
    ScopeError::InvalidInput {
        field: event.to_string(),
        value: value.to_string(),
    }
}

/// Resolves a control event and its submitted value into a command.
///
/// Unknown events fail with `InvalidRequest`; unusable values with `InvalidInput`.
pub fn resolve(event: &str, value: &str) -> AppResult<ScopeCommand> {
    let control = lookup(event)
        .ok_or_else(|| ScopeError::InvalidRequest(format!("unknown control '{event}'")))?;
    let text = value.trim();

    match &control.binding {
        Binding::Action(command) => Ok(command.clone()),
        Binding::Number(make) => text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(make)
            .ok_or_else(|| invalid(event, value)),
        Binding::Count(make) => text
            .parse::<u32>()
            .map(make)
            .map_err(|_| invalid(event, value)),
        Binding::Text(make) => Ok(make(text.to_string())),
    }
}

/// Parses a `<event> [value]` line as typed on a terminal.
pub fn parse_line(line: &str) -> AppResult<ScopeCommand> {
    let line = line.trim();
    let (event, value) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    resolve(event, value)
}

/// Usage text listing every control.
pub fn help_text() -> String {
    let width = BINDINGS.iter().map(|b| b.event.len()).max().unwrap_or(0);
    BINDINGS
        .iter()
        .map(|b| format!("  {:width$}  {}", b.event, b.help, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_unique() {
        let mut names: Vec<_> = BINDINGS.iter().map(|b| b.event).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BINDINGS.len());
    }

    #[test]
    fn numeric_fields_parse() {
        assert_eq!(resolve("exposure", " 2500 ").unwrap(), ScopeCommand::SetExposure(2500.0));
        assert_eq!(resolve("num_avg", "4").unwrap(), ScopeCommand::SetNumToAverage(4));
    }

    #[test]
    fn empty_and_non_numeric_input_is_invalid() {
        for (event, value) in [("gain", ""), ("gain", "loud"), ("fps", "nan"), ("counter", "-1"), ("num_images", "2.5")] {
            assert!(
                matches!(resolve(event, value), Err(ScopeError::InvalidInput { .. })),
                "{event}={value:?} should be rejected"
            );
        }
    }

    #[test]
    fn lines_split_on_first_whitespace() {
        assert_eq!(
            parse_line("name_format beads {date} run.2\n").unwrap(),
            ScopeCommand::SetNameTemplate("beads {date} run.2".into())
        );
        assert_eq!(parse_line("led_off").unwrap(), ScopeCommand::SetColor(Color::Off));
        assert!(matches!(parse_line("warp 9"), Err(ScopeError::InvalidRequest(_))));
    }
}
