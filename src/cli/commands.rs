use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::info;
use std::io::Write;
use std::net::SocketAddr;

use crate::config::Config;
use crate::devices::{RelayBoard, RelayState};
use crate::modbus::ModbusTransport;
use crate::output::DataFormatter;
use crate::utils::error::{RelayError, ValidationError};

pub const DEFAULT_SIMULATOR_BIND: &str = "127.0.0.1:5020";

pub fn build_cli() -> Command {
    Command::new("relayctl")
        .version(crate::VERSION)
        .about("Operator tool for an 8-channel Modbus TCP relay bank")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .global(true)
                .help("Relay bank hostname or IP address"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .global(true)
                .value_parser(value_parser!(u16))
                .help("Modbus TCP port"),
        )
        .arg(
            Arg::new("unit-id")
                .short('u')
                .long("unit-id")
                .value_name("ID")
                .global(true)
                .value_parser(value_parser!(u8))
                .help("Modbus unit identifier"),
        )
        .arg(
            Arg::new("timeout-ms")
                .short('t')
                .long("timeout-ms")
                .value_name("MS")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Per-request timeout in milliseconds"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .global(true)
                .value_parser(["console", "json"])
                .help("Output format"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(Command::new("shell").about("Interactive menu (default)"))
        .subcommand(Command::new("status").about("Read all relay states"))
        .subcommand(
            Command::new("set")
                .about("Switch a relay on or off")
                .arg(relay_arg())
                .arg(
                    Arg::new("state")
                        .required(true)
                        .help("on/off or 1/0"),
                ),
        )
        .subcommand(
            Command::new("arm")
                .about("Store a duration for a relay and arm it")
                .arg(relay_arg())
                .arg(
                    Arg::new("duration_ms")
                        .required(true)
                        .allow_negative_numbers(true)
                        .help("Timed-run length in milliseconds (1-65535)"),
                ),
        )
        .subcommand(Command::new("trigger").about("Start every armed relay"))
        .subcommand(Command::new("estop").about("Emergency stop: all relays off, arming cleared"))
        .subcommand(Command::new("info").about("Read firmware version, name and serial number"))
        .subcommand(
            Command::new("simulate")
                .about("Serve a simulated relay bank over Modbus TCP")
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .value_name("ADDR")
                        .default_value(DEFAULT_SIMULATOR_BIND)
                        .value_parser(value_parser!(SocketAddr))
                        .help("Listen address"),
                ),
        )
        .subcommand(
            Command::new("init-config")
                .about("Write the effective configuration to a TOML file")
                .arg(Arg::new("path").required(true).value_name("FILE")),
        )
}

fn relay_arg() -> Arg {
    Arg::new("relay")
        .required(true)
        .allow_negative_numbers(true)
        .help("Relay number (0-7)")
}

/// Parses operator text as an integer; range checks are left to the operation.
pub fn parse_integer(text: &str, what: &str) -> Result<i64, ValidationError> {
    let text = text.trim();
    text.parse::<i64>()
        .map_err(|_| ValidationError::InvalidInput(format!("{} '{}' is not a number", what, text)))
}

fn required_value<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str, ValidationError> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| ValidationError::InvalidInput(format!("missing <{}>", id)))
}

/// Runs a one-shot device command. Returns `Ok(false)` when no such command was given.
pub async fn handle_subcommands(
    matches: &ArgMatches,
    client: &dyn ModbusTransport,
    formatter: &dyn DataFormatter,
    out: &mut dyn Write,
) -> Result<bool, RelayError> {
    let board = RelayBoard::new();

    if matches.subcommand_matches("status").is_some() {
        let status = board.read_all_relay_status(client).await?;
        writeln!(out, "{}", formatter.format_data(&status))?;
        return Ok(true);
    }

    if let Some(set_matches) = matches.subcommand_matches("set") {
        let relay = parse_integer(required_value(set_matches, "relay")?, "relay")?;
        let state: RelayState = required_value(set_matches, "state")?.parse()?;

        board.set_relay_manual(client, relay, state).await?;
        writeln!(
            out,
            "{}",
            formatter.format_ack(&format!("Relay {} set to {}", relay, state))
        )?;
        return Ok(true);
    }

    if let Some(arm_matches) = matches.subcommand_matches("arm") {
        let relay = parse_integer(required_value(arm_matches, "relay")?, "relay")?;
        let duration_ms = parse_integer(required_value(arm_matches, "duration_ms")?, "duration")?;

        board.arm_relay(client, relay, duration_ms).await?;
        writeln!(
            out,
            "{}",
            formatter.format_ack(&format!(
                "Relay {} is ARMED for {} ms and ready to be triggered",
                relay, duration_ms
            ))
        )?;
        return Ok(true);
    }

    if matches.subcommand_matches("trigger").is_some() {
        board.execute_global_trigger(client).await?;
        writeln!(out, "{}", formatter.format_ack("Global trigger sent"))?;
        return Ok(true);
    }

    if matches.subcommand_matches("estop").is_some() {
        board.emergency_stop(client).await?;
        writeln!(out, "{}", formatter.format_ack("Emergency stop sent"))?;
        return Ok(true);
    }

    if matches.subcommand_matches("info").is_some() {
        let device_info = board.read_device_info(client).await?;
        writeln!(out, "{}", formatter.format_data(&device_info))?;
        return Ok(true);
    }

    Ok(false)
}

/// Runs the commands that never talk to a device. Returns `Ok(false)` when none was given.
pub async fn handle_local_commands(
    matches: &ArgMatches,
    config: &Config,
) -> Result<bool, RelayError> {
    if let Some(init_matches) = matches.subcommand_matches("init-config") {
        let path = required_value(init_matches, "path")?;
        config.save_to_file(path)?;
        info!("💾 Configuration written to {}", path);
        println!("✅ Configuration written to {}", path);
        return Ok(true);
    }

    if let Some(sim_matches) = matches.subcommand_matches("simulate") {
        let bind_addr = sim_matches
            .get_one::<SocketAddr>("bind")
            .copied()
            .ok_or_else(|| ValidationError::InvalidInput("missing --bind".to_string()))?;
        run_simulate(bind_addr).await?;
        return Ok(true);
    }

    Ok(false)
}

#[cfg(feature = "simulator")]
async fn run_simulate(bind_addr: SocketAddr) -> Result<(), RelayError> {
    use crate::devices::RelayBoardModel;
    use std::sync::{Arc, Mutex};

    let board = Arc::new(Mutex::new(RelayBoardModel::default()));
    crate::services::run_simulator(bind_addr, board).await?;
    Ok(())
}

#[cfg(not(feature = "simulator"))]
async fn run_simulate(_bind_addr: SocketAddr) -> Result<(), RelayError> {
    Err(RelayError::Config(
        "relayctl was built without the `simulator` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::SimulatedTransport;
    use crate::modbus::ModbusRequest;
    use crate::output::{ConsoleFormatter, JsonFormatter};

    async fn run(args: &[&str], transport: &SimulatedTransport) -> (Result<bool, RelayError>, String) {
        let mut argv = vec!["relayctl"];
        argv.extend_from_slice(args);
        let matches = build_cli().get_matches_from(argv);
        let mut out = Vec::new();
        let result = handle_subcommands(&matches, transport, &ConsoleFormatter, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer(" 3 ", "relay"), Ok(3));
        assert_eq!(parse_integer("-1", "relay"), Ok(-1));
        assert!(matches!(
            parse_integer("three", "relay"),
            Err(ValidationError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_set_command() {
        let transport = SimulatedTransport::new();
        let (result, out) = run(&["set", "5", "on"], &transport).await;
        assert_eq!(result, Ok(true));
        assert!(out.contains("Relay 5 set to ON"));
        assert_eq!(
            transport.journal(),
            vec![ModbusRequest::WriteSingleCoil { address: 5, value: true }]
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_send_nothing() {
        let transport = SimulatedTransport::new();

        let (result, _) = run(&["set", "-1", "on"], &transport).await;
        assert!(result.unwrap_err().is_validation());

        let (result, _) = run(&["set", "x", "on"], &transport).await;
        assert!(result.unwrap_err().is_validation());

        let (result, _) = run(&["arm", "2", "0"], &transport).await;
        assert!(result.unwrap_err().is_validation());

        let (result, _) = run(&["set", "1", "maybe"], &transport).await;
        assert!(result.unwrap_err().is_validation());

        assert!(transport.journal().is_empty());
    }

    #[tokio::test]
    async fn test_arm_trigger_status() {
        let transport = SimulatedTransport::new();
        assert_eq!(run(&["arm", "2", "60000"], &transport).await.0, Ok(true));
        assert_eq!(run(&["trigger"], &transport).await.0, Ok(true));

        let (result, out) = run(&["status"], &transport).await;
        assert_eq!(result, Ok(true));
        assert!(out.lines().any(|l| l.starts_with("Relay 2:") && l.ends_with("ON")));
        assert!(out.contains("Master Status (Any Relay On): ON"));
    }

    #[tokio::test]
    async fn test_info_as_json() {
        let transport = SimulatedTransport::new();
        let matches = build_cli().get_matches_from(["relayctl", "info"]);
        let mut out = Vec::new();
        let handled = handle_subcommands(&matches, &transport, &JsonFormatter, &mut out)
            .await
            .unwrap();
        assert!(handled);

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["data"]["device_name"], "ESP32 Relay Board");
        assert_eq!(value["data"]["serial_number"], 4211583);
    }

    #[tokio::test]
    async fn test_shell_is_not_a_one_shot_command() {
        let transport = SimulatedTransport::new();
        assert_eq!(run(&["shell"], &transport).await.0, Ok(false));
        assert_eq!(run(&[], &transport).await.0, Ok(false));
    }

    #[tokio::test]
    async fn test_init_config_writes_effective_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relayctl.toml");
        let matches = build_cli().get_matches_from([
            "relayctl",
            "--host",
            "192.168.20.119",
            "init-config",
            path.to_str().unwrap(),
        ]);
        let config = Config::from_matches(&matches).unwrap();
        assert!(handle_local_commands(&matches, &config).await.unwrap());
        assert_eq!(Config::from_file(&path).unwrap().host, "192.168.20.119");
    }
}
