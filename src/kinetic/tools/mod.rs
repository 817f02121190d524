// SPDX-License-Identifier: MIT

pub mod builtin;
