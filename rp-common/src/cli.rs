// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anstyle::{AnsiColor, Color, RgbColor, Style};
use clap::builder::Styles;

const HEADER: RgbColor = RgbColor(245, 207, 101);
const LITERAL: RgbColor = RgbColor(72, 213, 151);

/// Help output styling shared by command line tools.
pub fn cli_style() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Rgb(HEADER))),
        )
        .literal(Style::new().bold().fg_color(Some(Color::Rgb(LITERAL))))
        .valid(Style::new().bold().fg_color(Some(Color::Rgb(LITERAL))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .usage(Style::new().bold().fg_color(Some(Color::Rgb(HEADER))))
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}
