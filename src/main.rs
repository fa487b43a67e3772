/*
 * Lua Plugin Host
 * Copyright (C) 2025 Akaere Networks
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::Result;
use clap::Parser;

use lua_plugin_host::Runner;
use lua_plugin_host::config::Cli;
use lua_plugin_host::core::logger::init_from_args;

fn main() -> Result<()> {
    let args = Cli::parse();

    init_from_args(args.debug, args.journald)?;

    let summary = Runner::new(args.host_config()).run()?;

    // A plugin asked to stop everything
    if let Some(status) = summary.terminated {
        std::process::exit(status);
    }

    Ok(())
}
