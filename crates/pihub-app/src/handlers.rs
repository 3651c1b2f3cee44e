//! Command handlers wired into the dispatcher.

use pihub_hw::Level;
use tracing::{error, info};

use crate::reply::{self, ReplyKind, HELP_LINES};
use crate::CommandContext;

const BAD_ARG_COUNT_MSG: &str = "incorrect number of arguments [use server help for manual]";

fn log_command(ctx: &CommandContext, name: &str) {
    match ctx.server.client_address(&ctx.client) {
        Ok(ip) => info!(client_ip = %ip, command = name, "command received"),
        Err(_) => info!(command = name, "command received (client address unavailable)"),
    }
}

fn send_info(ctx: &CommandContext, msg: &str) {
    reply::send(&ctx.server, &ctx.client, ReplyKind::Info, msg);
}

fn send_error(ctx: &CommandContext, msg: &str) {
    reply::send(&ctx.server, &ctx.client, ReplyKind::Error, msg);
}

fn parse_line_number(arg: &str) -> Result<u8, &'static str> {
    let value: u32 = arg.parse().map_err(|_| "failed to convert line number")?;
    u8::try_from(value).map_err(|_| "line number outside the supported range")
}

fn parse_level(arg: &str) -> Result<Level, &'static str> {
    let value: u32 = arg.parse().map_err(|_| "failed to convert state number")?;
    match value {
        0 => Ok(Level::Low),
        1 => Ok(Level::High),
        _ => Err("incorrect state value (only 0 or 1 is allowed)"),
    }
}

/// `gpio set <line> <0|1>`
pub(crate) fn gpio_set(args: &[&str], ctx: &CommandContext) {
    log_command(ctx, "gpio set");

    if args.len() != 2 {
        send_error(ctx, BAD_ARG_COUNT_MSG);
        return;
    }
    let line = match parse_line_number(args[0]) {
        Ok(line) => line,
        Err(msg) => return send_error(ctx, msg),
    };
    let level = match parse_level(args[1]) {
        Ok(level) => level,
        Err(msg) => return send_error(ctx, msg),
    };

    match ctx.hub.gpio.set(line, level) {
        Ok(()) => {
            info!(line, %level, "gpio line set");
            send_info(ctx, &format!("GPIO line {line} set to {level}"));
        }
        Err(e) => {
            error!(line, %level, error = %e, "gpio set failed");
            send_error(
                ctx,
                &format!("failed to set the GPIO output (line: {line}, state: {level})"),
            );
        }
    }
}

/// `gpio get <line>`
pub(crate) fn gpio_get(args: &[&str], ctx: &CommandContext) {
    log_command(ctx, "gpio get");

    if args.len() != 1 {
        send_error(ctx, BAD_ARG_COUNT_MSG);
        return;
    }
    let line = match parse_line_number(args[0]) {
        Ok(line) => line,
        Err(msg) => return send_error(ctx, msg),
    };

    match ctx.hub.gpio.get(line) {
        Ok(level) => send_info(ctx, &format!("GPIO line {line} is {level}")),
        Err(e) => {
            error!(line, error = %e, "gpio get failed");
            send_error(ctx, &format!("failed to get the GPIO input (line: {line})"));
        }
    }
}

/// `sensor list`
pub(crate) fn sensor_list(args: &[&str], ctx: &CommandContext) {
    log_command(ctx, "sensor list");
    let _ = args;

    if ctx.hub.sensors.is_empty() {
        send_error(ctx, "No sensors configured");
        return;
    }
    for (id, sensor) in ctx.hub.sensors.iter().enumerate() {
        send_info(
            ctx,
            &format!(
                "sensor id: #{id}; addr: {:#04X}; bus: {}",
                sensor.addr(),
                sensor.bus_name()
            ),
        );
    }
}

/// `sensor get <id> <temp|hum|press>`
pub(crate) fn sensor_get(args: &[&str], ctx: &CommandContext) {
    log_command(ctx, "sensor get");

    if args.len() != 2 {
        send_error(ctx, BAD_ARG_COUNT_MSG);
        return;
    }
    let id: usize = match args[0].parse() {
        Ok(id) => id,
        Err(_) => return send_error(ctx, "failed to convert the sensor ID"),
    };
    let Some(sensor) = ctx.hub.sensors.get(id) else {
        return send_error(ctx, "invalid sensor ID");
    };

    let measurement = args[1];
    let outcome = if measurement.eq_ignore_ascii_case("temp") {
        sensor
            .device
            .temperature()
            .map(|t| format!("sensor #{id} returned temp: {t:.2} *C"))
            .map_err(|e| (e, "temp"))
    } else if measurement.eq_ignore_ascii_case("hum") {
        sensor
            .device
            .humidity()
            .map(|h| format!("sensor #{id} returned humidity: {h:.2} %"))
            .map_err(|e| (e, "humidity"))
    } else if measurement.eq_ignore_ascii_case("press") {
        sensor
            .device
            .pressure()
            .map(|p| format!("sensor #{id} returned press: {p:.2} Pa"))
            .map_err(|e| (e, "press"))
    } else {
        return send_error(ctx, "unsupported measurement type");
    };

    match outcome {
        Ok(msg) => send_info(ctx, &msg),
        Err((e, kind)) => {
            error!(sensor = id, error = %e, "sensor read failed");
            send_error(ctx, &format!("failed to read {kind} from sensor #{id}"));
        }
    }
}

/// `server status`
pub(crate) fn server_status(args: &[&str], ctx: &CommandContext) {
    log_command(ctx, "server status");
    let _ = args;

    let memory = match ctx.hub.stats.memory() {
        Ok(memory) => memory,
        Err(e) => {
            error!(error = %e, "memory stats failed");
            return send_error(ctx, "failed to retrieve memory stats");
        }
    };
    let network = match ctx.hub.stats.network(&ctx.hub.net_interface) {
        Ok(network) => network,
        Err(e) => {
            error!(error = %e, "network stats failed");
            return send_error(ctx, "failed to retrieve network stats");
        }
    };
    let uptime = match ctx.hub.stats.uptime() {
        Ok(uptime) => uptime,
        Err(e) => {
            error!(error = %e, "uptime stats failed");
            return send_error(ctx, "failed to retrieve uptime stats");
        }
    };

    send_info(
        ctx,
        &format!(
            "Mem {} kB/{} kB (available/total) | Net tx: {} kB, rx: {} kB | Uptime {}.{:02} s",
            memory.available_kb,
            memory.total_kb,
            network.tx_bytes / 1000,
            network.rx_bytes / 1000,
            uptime.up_secs,
            uptime.up_centis,
        ),
    );
    send_info(
        ctx,
        &format!("connected clients: {}", ctx.server.client_count()),
    );
}

/// `server uptime`
pub(crate) fn server_uptime(args: &[&str], ctx: &CommandContext) {
    log_command(ctx, "server uptime");
    let _ = args;

    match ctx.hub.stats.uptime() {
        Ok(uptime) => send_info(
            ctx,
            &format!("uptime {}.{:02} s", uptime.up_secs, uptime.up_centis),
        ),
        Err(e) => {
            error!(error = %e, "uptime stats failed");
            send_error(ctx, "failed to retrieve uptime info");
        }
    }
}

/// `server net`
pub(crate) fn server_net(args: &[&str], ctx: &CommandContext) {
    log_command(ctx, "server net");
    let _ = args;

    match ctx.hub.stats.network(&ctx.hub.net_interface) {
        Ok(net) => send_info(
            ctx,
            &format!(
                "net tx: {} kB ({} packets), rx: {} kB ({} packets)",
                net.tx_bytes / 1000,
                net.tx_packets,
                net.rx_bytes / 1000,
                net.rx_packets,
            ),
        ),
        Err(e) => {
            error!(error = %e, "network stats failed");
            send_error(ctx, "failed to retrieve network stats");
        }
    }
}

/// `server disconnect`
pub(crate) fn server_disconnect(args: &[&str], ctx: &CommandContext) {
    log_command(ctx, "server disconnect");
    let _ = args;

    send_info(ctx, "disconnecting from the server...");

    if let Err(e) = ctx.server.disconnect(&ctx.client, false) {
        error!(client = ctx.client.key(), error = %e, "disconnect failed");
        send_error(ctx, "failed to disconnect from the server");
    }
}

/// `server help`
pub(crate) fn server_help(args: &[&str], ctx: &CommandContext) {
    log_command(ctx, "server help");
    let _ = args;

    for line in HELP_LINES {
        send_info(ctx, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_number_parsing() {
        assert_eq!(parse_line_number("13"), Ok(13));
        assert_eq!(parse_line_number("0"), Ok(0));
        assert!(parse_line_number("abc").is_err());
        assert!(parse_line_number("-1").is_err());
        assert_eq!(
            parse_line_number("300"),
            Err("line number outside the supported range")
        );
    }

    #[test]
    fn level_parsing() {
        assert_eq!(parse_level("0"), Ok(Level::Low));
        assert_eq!(parse_level("1"), Ok(Level::High));
        assert_eq!(
            parse_level("2"),
            Err("incorrect state value (only 0 or 1 is allowed)")
        );
        assert_eq!(parse_level("on"), Err("failed to convert state number"));
    }
}
