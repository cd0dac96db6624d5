use log::debug;
use std::io::{BufRead, Write};

use super::commands::parse_integer;
use crate::devices::{RelayBoard, RelayIndex, RelayState};
use crate::modbus::ModbusTransport;
use crate::output::DataFormatter;
use crate::utils::error::RelayError;

/// Numbered-menu front end over the relay operations.
///
/// Reads operator lines from `input` and writes prompts and results to
/// `output`. A failed operation is printed and the menu comes back; only
/// a failure of `input`/`output` themselves ends the loop with an error.
pub struct Shell<'a, R, W> {
    client: &'a dyn ModbusTransport,
    formatter: &'a dyn DataFormatter,
    board: RelayBoard,
    target: String,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> Shell<'a, R, W> {
    pub fn new(
        client: &'a dyn ModbusTransport,
        formatter: &'a dyn DataFormatter,
        target: impl Into<String>,
        input: R,
        output: W,
    ) -> Self {
        Self {
            client,
            formatter,
            board: RelayBoard::new(),
            target: target.into(),
            input,
            output,
        }
    }

    /// Runs until the operator picks exit or the input ends.
    pub async fn run(&mut self) -> Result<(), RelayError> {
        loop {
            self.print_menu()?;
            let choice = match self.prompt("Enter your choice: ")? {
                Some(choice) => choice,
                None => {
                    writeln!(self.output, "\nExiting...")?;
                    break;
                }
            };
            debug!("Shell choice: {:?}", choice);

            let result = match choice.as_str() {
                "1" => self.show_status().await,
                "2" => self.toggle_relay().await,
                "3" => self.arm_relay().await,
                "4" => self.global_trigger().await,
                "5" => self.show_device_info().await,
                "6" => self.emergency_stop().await,
                "7" => {
                    writeln!(self.output, "Exiting...")?;
                    break;
                }
                _ => {
                    writeln!(self.output, "Invalid choice. Please try again.")?;
                    Ok(())
                }
            };

            match result {
                Err(RelayError::Io(e)) => return Err(RelayError::Io(e)),
                Err(e) => {
                    writeln!(self.output, "{}", self.formatter.format_error(&e))?;
                    if e.is_session_lost() {
                        self.offer_reconnect().await?;
                    }
                }
                Ok(()) => {}
            }
        }
        self.output.flush()?;
        Ok(())
    }

    fn print_menu(&mut self) -> Result<(), RelayError> {
        writeln!(self.output, "\n--- Modbus Relay Bank ---")?;
        writeln!(self.output, "Connected to: {}", self.target)?;
        writeln!(self.output, "1. Read all relay statuses")?;
        writeln!(self.output, "2. Toggle a relay manually (ON/OFF)")?;
        writeln!(self.output, "3. Configure and Arm a Relay for Timed Run")?;
        writeln!(self.output, "4. Execute Global Trigger (Start all armed relays)")?;
        writeln!(self.output, "5. Read Device Information")?;
        writeln!(self.output, "6. Emergency Stop (all relays OFF, arming cleared)")?;
        writeln!(self.output, "7. Exit")?;
        Ok(())
    }

    /// `None` at end of input.
    fn prompt(&mut self, text: &str) -> Result<Option<String>, RelayError> {
        write!(self.output, "{}", text)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    async fn offer_reconnect(&mut self) -> Result<(), RelayError> {
        let prompt = format!("Connection lost. Reconnect to {}? (y/n): ", self.target);
        let Some(answer) = self.prompt(&prompt)? else {
            return Ok(());
        };
        if !matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes") {
            return Ok(());
        }

        match self.client.reconnect().await {
            Ok(()) => writeln!(self.output, "Reconnected.")?,
            Err(e) => writeln!(self.output, "{}", self.formatter.format_error(&e))?,
        }
        Ok(())
    }

    async fn show_status(&mut self) -> Result<(), RelayError> {
        writeln!(self.output, "\nReading current relay status...")?;
        let status = self.board.read_all_relay_status(self.client).await?;
        writeln!(self.output, "{}", self.formatter.format_data(&status))?;
        Ok(())
    }

    async fn toggle_relay(&mut self) -> Result<(), RelayError> {
        let Some(relay_text) = self.prompt("Enter relay number (0-7): ")? else {
            return Ok(());
        };
        let relay = parse_integer(&relay_text, "relay")?;
        RelayIndex::new(relay)?;

        let Some(state_text) = self.prompt("Enter state (1 for ON, 0 for OFF): ")? else {
            return Ok(());
        };
        let state: RelayState = state_text.parse()?;

        writeln!(self.output, "\nSetting Relay {} to {}...", relay, state)?;
        self.board.set_relay_manual(self.client, relay, state).await?;
        writeln!(self.output, "Command sent successfully.")?;
        Ok(())
    }

    async fn arm_relay(&mut self) -> Result<(), RelayError> {
        let Some(relay_text) = self.prompt("Enter relay number to arm (0-7): ")? else {
            return Ok(());
        };
        let relay = parse_integer(&relay_text, "relay")?;
        RelayIndex::new(relay)?;

        let Some(duration_text) =
            self.prompt("Enter duration in milliseconds for this relay: ")?
        else {
            return Ok(());
        };
        let duration_ms = parse_integer(&duration_text, "duration")?;

        writeln!(
            self.output,
            "\nSetting duration for Relay {} to {}ms and arming...",
            relay, duration_ms
        )?;
        self.board.arm_relay(self.client, relay, duration_ms).await?;
        writeln!(self.output, "Relay {} is ARMED and ready to be triggered.", relay)?;
        Ok(())
    }

    async fn global_trigger(&mut self) -> Result<(), RelayError> {
        writeln!(self.output, "\nSending GLOBAL TRIGGER to start all armed relays...")?;
        self.board.execute_global_trigger(self.client).await?;
        writeln!(self.output, "Global trigger command sent successfully.")?;
        Ok(())
    }

    async fn show_device_info(&mut self) -> Result<(), RelayError> {
        writeln!(self.output, "\nReading Device Information...")?;
        let info = self.board.read_device_info(self.client).await?;
        writeln!(self.output, "{}", self.formatter.format_data(&info))?;
        Ok(())
    }

    async fn emergency_stop(&mut self) -> Result<(), RelayError> {
        writeln!(self.output, "\nSending EMERGENCY STOP...")?;
        self.board.emergency_stop(self.client).await?;
        writeln!(self.output, "All relays stopped.")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::SimulatedTransport;
    use crate::modbus::ModbusRequest;
    use crate::output::ConsoleFormatter;
    use crate::utils::error::TransportError;
    use std::io::Cursor;
    use std::time::Duration;

    async fn run_script(transport: &SimulatedTransport, script: &str) -> String {
        let mut output = Vec::new();
        {
            let mut shell = Shell::new(
                transport,
                &ConsoleFormatter,
                "sim",
                Cursor::new(script.as_bytes().to_vec()),
                &mut output,
            );
            shell.run().await.unwrap();
        }
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn test_toggle_then_status() {
        let transport = SimulatedTransport::new();
        let out = run_script(&transport, "2\n4\n1\n1\n7\n").await;

        assert!(out.contains("Setting Relay 4 to ON..."));
        assert!(out.contains("Command sent successfully."));
        assert!(out.lines().any(|l| l.starts_with("Relay 4:") && l.ends_with("ON")));
        assert!(out.contains("Master Status (Any Relay On): ON"));
        assert!(out.trim_end().ends_with("Exiting..."));
    }

    #[tokio::test]
    async fn test_arm_and_trigger() {
        let transport = SimulatedTransport::new();
        let out = run_script(&transport, "3\n3\n1500\n4\n7\n").await;

        assert!(out.contains("Relay 3 is ARMED and ready to be triggered."));
        assert!(out.contains("Global trigger command sent successfully."));
        assert_eq!(
            transport.journal(),
            vec![
                ModbusRequest::WriteSingleRegister { address: 103, value: 1500 },
                ModbusRequest::WriteSingleCoil { address: 23, value: true },
                ModbusRequest::WriteSingleCoil { address: 30, value: true },
            ]
        );
    }

    #[tokio::test]
    async fn test_bad_input_is_reported_and_loop_continues() {
        let transport = SimulatedTransport::new();
        let out = run_script(&transport, "2\nabc\n2\n9\n3\n1\n0\n9\n5\n").await;

        assert!(out.contains("relay 'abc' is not a number"));
        assert!(out.contains("Invalid relay number: 9 (must be 0-7)"));
        assert!(out.contains("Invalid duration: 0 ms (must be 1-65535)"));
        assert!(out.contains("Invalid choice. Please try again."));
        assert!(out.contains("Device Name:      ESP32 Relay Board"));
        // End of input without choosing exit.
        assert!(out.trim_end().ends_with("Exiting..."));

        let reads = transport.journal();
        assert!(reads.iter().all(|r| !r.is_write()));
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_shell_alive() {
        let transport = SimulatedTransport::new();
        transport.fail_request(0);
        let out = run_script(&transport, "6\n6\n7\n").await;

        assert!(out.contains("❌ IO error: simulated failure of request #0"));
        assert!(out.contains("All relays stopped."));
    }

    #[tokio::test]
    async fn test_timeout_offers_reconnect() {
        let transport = SimulatedTransport::new();
        transport.fail_request_with(0, TransportError::Timeout(Duration::from_millis(200)));
        let out = run_script(&transport, "1\ny\n1\n7\n").await;

        assert!(out.contains("❌ Request timed out after 200ms"));
        assert!(out.contains("Connection lost. Reconnect to sim? (y/n): "));
        assert!(out.contains("Reconnected."));
        assert!(out.contains("Master Status (Any Relay On): OFF"));
        assert_eq!(transport.reconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_can_be_declined() {
        let transport = SimulatedTransport::new();
        transport.fail_request_with(0, TransportError::NotConnected);
        let out = run_script(&transport, "4\nn\n7\n").await;

        assert!(out.contains("Connection lost."));
        assert!(!out.contains("Reconnected."));
        assert_eq!(transport.reconnect_count(), 0);
    }
}
