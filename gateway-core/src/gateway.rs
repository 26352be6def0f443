// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Start-up glue: stored configuration, optional loader session, then the
//! CAN and Modbus endpoints.

use crate::canbus::CanBus;
use crate::config::GatewayConfig;
use crate::drivers::{CanBinder, Clock, FlashMap, ModbusEngine, TaskSpawner, Uart};
use crate::error::Error;
use crate::loader::{ExtFlashLoader, LoaderStats};
use crate::modbus::{HoldingRegisters, ModbusSlave};

/// Partition holding the persisted [`GatewayConfig`].
pub const CONFIG_PARTITION: &str = "config_part";

/// Running endpoints.
pub struct Gateway<'a, B: CanBinder> {
    pub config: GatewayConfig,
    pub can: CanBus<B::Device>,
    pub modbus: ModbusSlave<'a>,
}

impl<'a, B: CanBinder> Gateway<'a, B> {
    /// Full boot sequence.
    ///
    /// Reads the stored configuration, runs the loader session if one is
    /// configured, then brings up the endpoints.
    #[allow(clippy::too_many_arguments)]
    pub fn start<M, U, C, S, E, F>(
        flash_map: &mut M,
        loader_uart: U,
        clock: C,
        binder: &mut B,
        spawner: &mut S,
        handler: F,
        engine: &mut E,
        regs: &'a HoldingRegisters<'a>,
    ) -> Result<Self, Error>
    where
        M: FlashMap,
        U: Uart,
        C: Clock,
        S: TaskSpawner,
        E: ModbusEngine<'a>,
        F: FnMut(&[u8]) + Send + 'static,
    {
        let config = load_config(flash_map);
        if let Some(stats) = run_loader(&config, loader_uart, clock, flash_map)? {
            info!(
                "Loader: {} commands, {} bytes written",
                stats.commands, stats.bytes_written
            );
        }
        Self::init(&config, binder, spawner, handler, engine, regs)
    }

    /// Bring up the CAN endpoint and the Modbus server.
    ///
    /// A CAN failure aborts before the Modbus server is registered.
    pub fn init<S, E, F>(
        config: &GatewayConfig,
        binder: &mut B,
        spawner: &mut S,
        handler: F,
        engine: &mut E,
        regs: &'a HoldingRegisters<'a>,
    ) -> Result<Self, Error>
    where
        S: TaskSpawner,
        E: ModbusEngine<'a>,
        F: FnMut(&[u8]) + Send + 'static,
    {
        let can = CanBus::init(binder, config.can_device.as_str(), &config.can, spawner, handler)?;
        let modbus = ModbusSlave::init(engine, config.modbus_iface.as_str(), &config.modbus, regs)?;
        Ok(Self {
            config: config.clone(),
            can,
            modbus,
        })
    }
}

/// Configuration stored in [`CONFIG_PARTITION`], or the build-time defaults
/// when the partition is missing or holds no valid record.
pub fn load_config<M: FlashMap>(flash_map: &mut M) -> GatewayConfig {
    match flash_map.open(CONFIG_PARTITION) {
        Ok(mut area) => {
            let config = GatewayConfig::load_or_default(&mut area);
            flash_map.close(area);
            config
        }
        Err(e) => {
            info!("No configuration partition ({}), using defaults", e);
            GatewayConfig::default()
        }
    }
}

/// Run the loader session if `config` asks for one.
///
/// The session normally ends by timeout; that outcome is not an error here.
/// Returns the session counters, or `None` when no session was configured.
pub fn run_loader<U, C, M>(
    config: &GatewayConfig,
    uart: U,
    clock: C,
    flash_map: &mut M,
) -> Result<Option<LoaderStats>, Error>
where
    U: Uart,
    C: Clock,
    M: FlashMap,
{
    let Some(timeout_sec) = config.loader_timeout_sec else {
        return Ok(None);
    };

    let mut loader = ExtFlashLoader::new(uart, clock, config.loader.clone());
    match loader.start(flash_map, timeout_sec) {
        Ok(()) | Err(Error::Timeout) => Ok(Some(loader.stats())),
        Err(e) => Err(e),
    }
}
