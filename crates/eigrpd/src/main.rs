// Copyright 2025 Cedric Hammes
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use colorful::{
    Color,
    Colorful,
};
use eigrpd::{
    config::{
        AuthConfig,
        InterfaceConfig,
        ProcessConfig,
        DEFAULT_HELLO_INTERVAL,
        DEFAULT_HOLD_TIME,
    },
    process::Process,
    scheduler::Scheduler,
};
use log::{
    error,
    info,
    LevelFilter,
};
use simple_logger::SimpleLogger;
use std::{
    net::Ipv4Addr,
    process::exit,
    sync::Arc,
};

// TODO: read this from a config file/wizard instead of hardcoding a single demonstration AS.
fn demo_config() -> ProcessConfig {
    ProcessConfig::new(Ipv4Addr::new(1, 1, 1, 1), 100).with_interface(InterfaceConfig {
        name: "eth0".into(),
        ifindex: 2,
        address: Ipv4Addr::new(10, 0, 0, 1),
        prefix_len: 30,
        bandwidth_kbps: 100_000,
        delay_10us: 10,
        mtu: 1500,
        hello_interval: DEFAULT_HELLO_INTERVAL,
        hold_time: DEFAULT_HOLD_TIME,
        authentication: AuthConfig::None,
    })
}

fn run() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let config = demo_config();

    #[cfg(target_os = "linux")]
    {
        let sink = runtime.block_on(async { eigrp_route::linux::NetlinkRouteSink::new() })?;
        let process = Process::new(config, sink, Arc::new(eigrp_route::null::NullKeychainSource));
        let mut scheduler = Scheduler::new(process, runtime)?;
        scheduler.run_until(|| false)?;
    }

    #[cfg(not(target_os = "linux"))]
    {
        info!("no Linux FIB backend on this platform, routes are logged only");
        let sink = eigrp_route::null::NullRouteSink::new();
        let process = Process::new(config, sink, Arc::new(eigrp_route::null::NullKeychainSource));
        let mut scheduler = Scheduler::new(process, runtime)?;
        scheduler.run_until(|| false)?;
    }

    Ok(())
}

fn main() {
    if let Err(error) = SimpleLogger::new().with_level(LevelFilter::Info).init() {
        println!("Unable to initialize logging => {}", error);
        exit(-1);
    }

    let header = r#" _____ ___ ____ ____  ____
| ____|_ _/ ___|  _ \|  _ \
|  _|  | | |  _| |_) | |_) |
| |___ | | |_| |  _ <|  __/
|_____|___\____|_| \_\_|
   EIGRP routing daemon"#;
    println!("{}\n", header.gradient(Color::Green).bold());

    info!("starting EIGRP process");
    if let Err(error) = run() {
        error!("fatal error: {error}");
        exit(-1);
    }
}
