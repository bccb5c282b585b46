//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::JSON_MODE;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use servo_core::error::{BuildError, ServoError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingMotor => {
                "What happened: No motor driver was provided to the controller.\nLikely causes: Hardware bring-up failed or the builder was not given a motor.\nHow to fix: Ensure the H-bridge pins initialize and are passed via with_motor(...).".to_string()
            }
            BuildError::MissingEndstop => {
                "What happened: No endstop input was provided to the controller.\nLikely causes: Endstop pin failed to initialize or was not wired into the builder.\nHow to fix: Check [pins].endstop in the config and pass the input via with_endstop(...).".to_string()
            }
            BuildError::MissingLink => {
                "What happened: No command/telemetry link was provided.\nLikely causes: Serial device failed to open or was not wired into the builder.\nHow to fix: Check [link].device and permissions, then pass it via with_link(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/servo.toml for a sample."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<ServoError>() {
        return match se {
            ServoError::HardwareFault(d) => format!(
                "What happened: A hardware peripheral faulted ({d}).\nLikely causes: Wiring, power, or GPIO/UART permissions.\nHow to fix: Check connections and device permissions, then restart the controller."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("config") {
        return format!(
            "What happened: {msg}.\nLikely causes: Malformed TOML or values failing validation.\nHow to fix: Correct the config file and rerun `servo check`."
        );
    }

    format!("What happened: {msg}.\nHow to fix: Re-run with --log-level=debug for more detail.")
}

/// Print the error the way the user asked for it: a JSON object in --json
/// mode, the humanized text otherwise.
pub fn report(err: &eyre::Report) {
    if JSON_MODE.get().copied().unwrap_or(false) {
        let obj = serde_json::json!({
            "error": err.to_string(),
            "detail": format!("{err:#}"),
        });
        eprintln!("{obj}");
    } else {
        eprintln!("{}", humanize(err));
    }
}
