use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

use nimbus_core::App;
use nimbus_ui::{AppServices, UiEvent, UiLoop, WeatherView};
use nimbus_weather::Units;

const HELP: &str = "Commands: location on|off, theme dark|light, lang <code>, \
unit metric|imperial|standard, city <name>, refresh, quit";

fn main() -> Result<()> {
    nimbus_core::init()?;

    let app = App::new()?;
    tracing::info!("Nimbus starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("nimbus-tokio")
        .build()?;

    let result = runtime.block_on(run(&app));
    // A pending stdin read can't be cancelled
    runtime.shutdown_timeout(Duration::from_secs(1));
    result?;

    tracing::info!("Nimbus stopped");
    Ok(())
}

async fn run(app: &App) -> Result<()> {
    let (services, samples) = AppServices::from_app(app, tokio::runtime::Handle::current())?;
    let (events_tx, events_rx) = mpsc::channel(32);

    println!("Nimbus weather");
    println!("  Config directory: {}", app.config().config_dir.display());
    println!("{}", HELP);

    tokio::spawn(print_weather(services.subscribe_weather()));
    tokio::spawn(read_commands(events_tx));

    // Commands typed meanwhile wait in the channel
    services.initialize_tracking().await;

    UiLoop::new(services, events_rx, samples).run().await;
    Ok(())
}

async fn read_commands(events: mpsc::Sender<UiEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };

        match parse_command(&line) {
            Ok(Some(event)) => {
                let quit = event == UiEvent::Shutdown;
                if events.send(event).await.is_err() || quit {
                    return;
                }
            }
            Ok(None) => {}
            Err(message) => println!("{}\n{}", message, HELP),
        }
    }

    let _ = events.send(UiEvent::Shutdown).await;
}

fn parse_command(line: &str) -> Result<Option<UiEvent>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (command, argument) = match line.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    };

    let event = match (command.to_lowercase().as_str(), argument) {
        ("location", "on") => UiEvent::LocationToggled(true),
        ("location", "off") => UiEvent::LocationToggled(false),
        ("theme", "dark") => UiEvent::ThemeToggled(true),
        ("theme", "light") => UiEvent::ThemeToggled(false),
        ("lang", code) if !code.is_empty() => UiEvent::LanguageChanged(code.to_string()),
        ("unit", unit) => UiEvent::UnitChanged(unit.parse::<Units>()?),
        ("city", name) if !name.is_empty() => UiEvent::CitySearched(name.to_string()),
        ("refresh", "") => UiEvent::RefreshRequested,
        ("quit" | "exit", "") => UiEvent::Shutdown,
        _ => return Err(format!("Unknown command: {}", line)),
    };
    Ok(Some(event))
}

async fn print_weather(mut view: watch::Receiver<WeatherView>) {
    while view.changed().await.is_ok() {
        let current = view.borrow_and_update().clone();
        if current.loading {
            continue;
        }
        if let Some(error) = &current.last_error {
            println!("Weather unavailable: {}", error);
        }
        if let Some(report) = &current.report {
            let symbol = report.units.temperature_symbol();
            println!(
                "{}: {:.1}{} ({}), feels like {:.1}{}, humidity {}%, wind {:.1} {}",
                report.place,
                report.current.temperature,
                symbol,
                report.current.condition.description(),
                report.current.feels_like,
                symbol,
                report.current.humidity,
                report.current.wind_speed,
                report.units.wind_speed_symbol()
            );
            for day in &report.daily {
                println!(
                    "  {}  {:.0}{} / {:.0}{}  {}  {}%",
                    day.date,
                    day.high,
                    symbol,
                    day.low,
                    symbol,
                    day.condition.description(),
                    day.precipitation_chance
                );
            }
            if let Some(air) = &report.air_quality {
                println!("  Air quality: {} ({:?})", air.european_aqi, air.level());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("location on"), Ok(Some(UiEvent::LocationToggled(true))));
        assert_eq!(parse_command("theme light"), Ok(Some(UiEvent::ThemeToggled(false))));
        assert_eq!(
            parse_command("city  New York "),
            Ok(Some(UiEvent::CitySearched("New York".to_string())))
        );
        assert_eq!(
            parse_command("unit imperial"),
            Ok(Some(UiEvent::UnitChanged(Units::Imperial)))
        );
        assert_eq!(parse_command("QUIT"), Ok(Some(UiEvent::Shutdown)));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command("location maybe").is_err());
        assert!(parse_command("unit kelvin").is_err());
        assert!(parse_command("city").is_err());
        assert!(parse_command("refresh now").is_err());
    }
}
