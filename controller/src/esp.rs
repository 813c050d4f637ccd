use core::convert::TryInto;
use std::{
    sync::{Arc, Mutex, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::Method,
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    gpio::{AnyIOPin, AnyOutputPin, PinDriver},
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution},
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};
use serde::Serialize;

use faceplate_common::{
    config::NetworkConfig, pwm, ButtonTrigger, EngineAction, FaceplateEngine,
    RuntimeConfig, ToggleOutcome,
};

use crate::{
    hardware::{Button, FaceplateHardware, LightDriver, ServoDriver},
    web::{self, ALLOW_ORIGIN, CONTROL_HTML, INDEX_HTML},
};

#[derive(Clone)]
struct SharedState {
    engine: Arc<Mutex<FaceplateEngine>>,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut runtime = RuntimeConfig::default();
    if let Err(err) = runtime.faceplate.validate() {
        warn!("invalid faceplate config ({err}); clamping to supported range");
        runtime.faceplate.sanitize();
    }
    if runtime.faceplate.toggle_wait_timeout_ms < runtime.faceplate.toggle_duration_ms() {
        warn!(
            "toggle wait timeout {}ms is shorter than a full toggle ({}ms); responses may report the old state",
            runtime.faceplate.toggle_wait_timeout_ms,
            runtime.faceplate.toggle_duration_ms()
        );
    }
    ensure_wifi_defaults(&mut runtime);

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, ledc, .. } = Peripherals::take()?;

    let wifi = match connect_wifi(modem, sys_loop, nvs_partition, &runtime.network) {
        Ok(wifi) => wifi,
        Err(err) => {
            warn!("wifi join failed: {err:#}");
            warn!("check the compiled-in credentials, signal strength and that the AP offers 2.4GHz");
            thread::sleep(Duration::from_millis(100));
            unsafe { esp_idf_svc::sys::esp_restart() }
        }
    };
    match wifi.wifi().sta_netif().get_ip_info() {
        Ok(ip_info) => info!("wifi connected, ip address {}", ip_info.ip),
        Err(err) => warn!("wifi connected but ip info unavailable: {err}"),
    }

    let pins = &runtime.pins;
    let servo_timer = LedcTimerDriver::new(
        ledc.timer0,
        &TimerConfig::default()
            .frequency(pwm::SERVO_PWM_FREQ_HZ.Hz())
            .resolution(Resolution::Bits14),
    )
    .context("failed to configure servo timer")?;
    let light_timer = LedcTimerDriver::new(
        ledc.timer1,
        &TimerConfig::default()
            .frequency(pwm::LIGHT_PWM_FREQ_HZ.Hz())
            .resolution(Resolution::Bits8),
    )
    .context("failed to configure light timer")?;

    let mut hardware = FaceplateHardware {
        servo_a: ServoDriver::new(
            LedcDriver::new(ledc.channel0, &servo_timer, unsafe {
                AnyOutputPin::new(pins.servo_a_pin)
            })
            .with_context(|| format!("servo A unavailable on GPIO{}", pins.servo_a_pin))?,
        ),
        servo_b: ServoDriver::new(
            LedcDriver::new(ledc.channel1, &servo_timer, unsafe {
                AnyOutputPin::new(pins.servo_b_pin)
            })
            .with_context(|| format!("servo B unavailable on GPIO{}", pins.servo_b_pin))?,
        ),
        light: LightDriver::new(
            LedcDriver::new(ledc.channel2, &light_timer, unsafe {
                AnyOutputPin::new(pins.light_pin)
            })
            .with_context(|| format!("light unavailable on GPIO{}", pins.light_pin))?,
            runtime.faceplate.max_brightness,
        ),
    };
    let button = Button::new(PinDriver::input(unsafe { AnyIOPin::new(pins.button_pin) })?)
        .with_context(|| format!("button unavailable on GPIO{}", pins.button_pin))?;

    let engine = FaceplateEngine::new(runtime.faceplate.clone());
    execute_engine_actions(&mut hardware, &engine.initial_actions());

    let state = SharedState {
        engine: Arc::new(Mutex::new(engine)),
    };

    let server = create_http_server(state.clone(), &runtime.network)?;
    info!("system ready");

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    run_control_loop(&state, &mut hardware, &button)
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    if network.wifi_ssid.is_empty() {
        return Err(anyhow!("no wifi ssid compiled in (set WIFI_SSID at build time)"));
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, joining `{}`", network.wifi_ssid);
    wifi.wifi_mut().connect()?;

    let timeout = Duration::from_millis(network.join_timeout_ms);
    let started = Instant::now();
    while !wifi.is_connected()? {
        if started.elapsed() >= timeout {
            let _ = wifi.disconnect();
            return Err(anyhow!(
                "not connected to `{}` after {}ms",
                network.wifi_ssid,
                network.join_timeout_ms
            ));
        }
        thread::sleep(Duration::from_millis(network.join_poll_ms));
        info!("waiting for wifi ({}ms)", started.elapsed().as_millis());
    }

    wifi.wait_netif_up()?;
    Ok(wifi)
}

fn create_http_server(
    state: SharedState,
    network: &NetworkConfig,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: network.http_port,
        stack_size: 10 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
        req.into_ok_response()?.write_all(INDEX_HTML.as_bytes())?;
        Ok(())
    })?;

    server.fn_handler::<anyhow::Error, _>("/control", Method::Get, move |req| {
        req.into_response(
            200,
            Some("OK"),
            &[("Content-Type", "text/html; charset=utf-8"), ALLOW_ORIGIN],
        )?
        .write_all(CONTROL_HTML.as_bytes())?;
        Ok(())
    })?;

    server.fn_handler::<anyhow::Error, _>("/toggle", Method::Options, move |req| {
        req.into_response(
            204,
            None,
            &[
                ALLOW_ORIGIN,
                ("Access-Control-Allow-Methods", "POST, OPTIONS"),
                ("Access-Control-Allow-Headers", "Content-Type"),
            ],
        )?;
        Ok(())
    })?;

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/toggle", Method::Post, move |req| {
            let now_ms = monotonic_ms();
            let (outcome, timeout_ms, poll_ms) = {
                let mut engine = state.engine.lock().unwrap();
                let outcome = engine.request_toggle(now_ms);
                (
                    outcome,
                    engine.config.toggle_wait_timeout_ms,
                    engine.config.tick_interval_ms,
                )
            };
            info!("http: {}", web::describe_outcome(&outcome));

            if let ToggleOutcome::Started { ticket, .. } = outcome {
                wait_for_completion(&state, ticket, timeout_ms, poll_ms);
            }

            // Rejected requests report the unchanged state rather than an error.
            let current = state.engine.lock().unwrap().state();
            let body = web::toggle_body(current)?;
            write_json_bytes(req, &body)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler("/api/status", Method::Get, move |req| {
            let status = state.engine.lock().unwrap().status(monotonic_ms());
            write_json(req, &status)
        })?;
    }

    info!("http server listening on port {}", network.http_port);
    Ok(server)
}

fn run_control_loop(
    state: &SharedState,
    hardware: &mut FaceplateHardware<'_>,
    button: &Button<'_>,
) -> ! {
    let (debounce_ms, tick_ms) = {
        let engine = state.engine.lock().unwrap();
        (engine.config.debounce_ms, engine.config.tick_interval_ms)
    };
    let mut trigger = ButtonTrigger::new(debounce_ms);

    loop {
        let now_ms = monotonic_ms();

        let (outcome, actions) = {
            let mut engine = state.engine.lock().unwrap();
            let outcome = trigger.poll(&mut engine, button.is_high(), now_ms);
            (outcome, engine.tick(now_ms))
        };
        if let Some(outcome) = outcome {
            if outcome.is_started() {
                info!("button: {}", web::describe_outcome(&outcome));
            } else {
                debug!("button: {}", web::describe_outcome(&outcome));
            }
        }

        execute_engine_actions(hardware, &actions);

        thread::sleep(Duration::from_millis(tick_ms));
    }
}

fn execute_engine_actions(hardware: &mut FaceplateHardware<'_>, actions: &[EngineAction]) {
    for action in actions {
        if let Err(err) = hardware.apply(action) {
            warn!("failed to apply {action:?}: {err}");
        }
    }
}

fn wait_for_completion(state: &SharedState, ticket: u64, timeout_ms: u64, poll_ms: u64) {
    let started = Instant::now();
    while completed_toggles(state) < ticket {
        if started.elapsed() >= Duration::from_millis(timeout_ms) {
            warn!("toggle #{ticket} still running after {timeout_ms}ms");
            return;
        }
        thread::sleep(Duration::from_millis(poll_ms));
    }
}

fn completed_toggles(state: &SharedState) -> u64 {
    state.engine.lock().unwrap().completed_toggles()
}

fn write_json<T: Serialize>(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    write_json_bytes(req, &body)
}

fn write_json_bytes(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    body: &[u8],
) -> anyhow::Result<()> {
    req.into_response(
        200,
        Some("OK"),
        &[
            ("Content-Type", "application/json; charset=utf-8"),
            ALLOW_ORIGIN,
        ],
    )?
    .write_all(body)?;
    Ok(())
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
