// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Typed, named arguments for components.
//!
//! An [`Arg`] is a name paired with a value whose type is recorded the first
//! time a value is stored. Operators, conditions, resources and schedulers
//! all take their parameters as an [`ArgList`], which can be built in code or
//! pulled out of a configuration file with
//! [`Fragment::from_config`](crate::fragment::Fragment::from_config).
//!
//! ```rust
//! use the_sluice::args::{Arg, ArgList};
//!
//! let mut args = ArgList::new();
//! args.add(Arg::new("count", 10i64)).unwrap();
//! args.add(Arg::new("rates", vec![0.5f64, 1.5])).unwrap();
//!
//! assert_eq!(args.get("count").unwrap().arg_type().unwrap().to_string(), "i64");
//! let count: u32 = args.value("count").unwrap().unwrap();
//! assert_eq!(count, 10);
//! ```

mod arg;
mod arg_list;

pub use arg::{Arg, ArgContainerType, ArgElementType, ArgScalar, ArgType, ArgValue};
pub use arg_list::ArgList;
