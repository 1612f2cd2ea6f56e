// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod accounts;
pub mod purposes;
pub mod transactions;
pub mod splits;
pub mod balances;
pub mod budgets;
pub mod projects;
pub mod reports;
pub mod importer;
pub mod exporter;
pub mod config;
pub mod doctor;
