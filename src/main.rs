use anyhow::Result;
use blescan::ble::host::BtleplugProvider;
use blescan::ble::provider::BleProvider;
use blescan::ble::{BleEvent, Command, Notice};
use blescan::config::{StartOptions, COMMAND_QUEUE_DEPTH, EVENT_QUEUE_DEPTH, NOTICE_QUEUE_DEPTH};
use blescan::BleManager;
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embassy_sync::channel::{Channel, DynamicReceiver, DynamicSender};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Provider tasks run on the tokio runtime and feed this channel.
static EVENTS: Channel<CriticalSectionRawMutex, BleEvent, EVENT_QUEUE_DEPTH> = Channel::new();

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let provider = match BtleplugProvider::new(EVENTS.sender()).await {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("No Bluetooth adapter found ({})", e);
            return Ok(());
        }
    };

    let commands: Channel<NoopRawMutex, Command, COMMAND_QUEUE_DEPTH> = Channel::new();
    let notices: Channel<NoopRawMutex, Notice, NOTICE_QUEUE_DEPTH> = Channel::new();
    let manager = BleManager::new(provider, notices.dyn_sender());

    manager.init(&StartOptions { show_alert: true }).await?;
    if let Err(e) = manager.refresh_connected().await {
        eprintln!("{}", e);
    }
    print_devices(&manager);
    print_help();

    tokio::select! {
        never = manager.run(EVENTS.dyn_receiver(), commands.dyn_receiver()) => never,
        never = show_notices(&manager, notices.dyn_receiver()) => never,
        result = read_commands(&manager, commands.dyn_sender()) => result,
    }
}

/// Print notices as they arrive; re-render the list when it changed.
async fn show_notices<P: BleProvider>(
    manager: &BleManager<'_, P>,
    notices: DynamicReceiver<'_, Notice>,
) -> ! {
    loop {
        match notices.receive().await {
            Notice::RegistryChanged => print_devices(manager),
            notice => println!("{}", notice),
        }
    }
}

/// Translate terminal lines into manager commands until `q` or EOF.
async fn read_commands<P: BleProvider>(
    manager: &BleManager<'_, P>,
    commands: DynamicSender<'_, Command>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();

        if input.eq_ignore_ascii_case("q") {
            return Ok(());
        }
        if input.eq_ignore_ascii_case("s") {
            commands.send(Command::StartScan).await;
            continue;
        }
        if input.eq_ignore_ascii_case("r") {
            commands.send(Command::RefreshConnected).await;
            continue;
        }
        if input.eq_ignore_ascii_case("l") {
            print_devices(manager);
            continue;
        }

        let snapshot = manager.snapshot();
        match input.parse::<usize>() {
            Ok(choice) if choice > 0 && choice <= snapshot.len() => {
                let id = snapshot[choice - 1].id.clone();
                commands.send(Command::Toggle(id)).await;
            }
            Ok(_) if snapshot.is_empty() => println!("No devices yet. Press 's' to scan."),
            Ok(_) => println!(
                "Invalid choice. Please enter a number between 1 and {}",
                snapshot.len()
            ),
            Err(_) => print_help(),
        }
    }
    Ok(())
}

fn print_devices<P: BleProvider>(manager: &BleManager<'_, P>) {
    println!("\n=== {} ===", manager.scan_state().label());
    let snapshot = manager.snapshot();
    if snapshot.is_empty() {
        println!("(no devices)");
    }
    for (i, record) in snapshot.iter().enumerate() {
        let marker = if record.connected { "*" } else { " " };
        println!(
            "{}{:>3}. {} ({}) {} dBm",
            marker,
            i + 1,
            record.label(),
            record.id,
            record.rssi
        );
    }
    println!("Status: {}", manager.connection_summary());
}

fn print_help() {
    println!("\n's' scan, 'r' refresh connected, 'l' list, <n> connect/disconnect, 'q' quit");
}
