// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::OnStateChangeArgs;

crate::define_fn_wrapper!(OnStateChange(Fn(OnStateChangeArgs<'_>)));
