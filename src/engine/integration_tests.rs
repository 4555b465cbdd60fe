// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// End-to-end runs of single fragments built from the bundled operators.
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::args::Arg;
    use crate::conditions::Condition;
    use crate::engine::StopReason;
    use crate::errors::ExecutionError;
    use crate::fragment::Fragment;
    use crate::graph::PortPairs;
    use crate::operator::{ComputeError, ExecutionContext, InputContext, Operator, OperatorLogic, OutputContext};
    use crate::operators::{Forward, PingMultiRx, PingMx, PingRx, PingTx};
    use crate::scheduler::SchedulerConfig;
    use crate::spec::OperatorSpec;

    fn ping_fragment(config: SchedulerConfig, count: u64) -> (Fragment, crate::operators::Received) {
        let mut fragment = Fragment::new("ping");
        fragment.set_scheduler(config);
        let tx = fragment.add_operator(PingTx::operator("tx", count)).unwrap();
        let (rx_op, received) = PingRx::operator("rx");
        let rx = fragment.add_operator(rx_op).unwrap();
        fragment.add_flow(tx, rx, PortPairs::none()).unwrap();
        (fragment, received)
    }

    #[tokio::test]
    async fn test_greedy_ping_delivers_every_value_in_order() {
        let (fragment, received) = ping_fragment(SchedulerConfig::greedy(), 3);

        let report = fragment.run_async().await.unwrap();

        assert_eq!(*received.lock(), vec![1, 2, 3]);
        assert_eq!(report.stop_reason, StopReason::Quiescent);
        assert_eq!(report.dispatches_of("tx"), 3);
        assert_eq!(report.dispatches_of("rx"), 3);
        assert_eq!(report.fragment, "ping");
    }

    #[tokio::test]
    async fn test_multi_thread_ping_delivers_every_value_in_order() {
        let (fragment, received) = ping_fragment(SchedulerConfig::multi_thread(2), 10);

        let report = fragment.run_async().await.unwrap();

        assert_eq!(*received.lock(), (1..=10).collect::<Vec<i64>>());
        assert_eq!(report.stop_reason, StopReason::Quiescent);
        assert_eq!(report.dispatches_of("tx"), 10);
    }

    #[tokio::test]
    async fn test_event_based_ping_delivers_every_value_in_order() {
        let (fragment, received) = ping_fragment(SchedulerConfig::event_based(2), 5);

        let report = fragment.run_async().await.unwrap();

        assert_eq!(*received.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(report.stop_reason, StopReason::Quiescent);
    }

    #[tokio::test]
    async fn test_multiplier_argument_reaches_the_operator() {
        let mut fragment = Fragment::new("mx");
        let tx = fragment.add_operator(PingTx::operator("tx", 3)).unwrap();
        let mx = fragment
            .add_operator(PingMx::operator("mx").with_arg(Arg::new("multiplier", 3i64)))
            .unwrap();
        let (rx_op, received) = PingRx::operator("rx");
        let rx = fragment.add_operator(rx_op).unwrap();
        fragment.add_flow(tx, mx, PortPairs::none()).unwrap();
        fragment.add_flow(mx, rx, PortPairs::none()).unwrap();

        fragment.run_async().await.unwrap();

        assert_eq!(*received.lock(), vec![3, 6, 9]);
    }

    #[tokio::test]
    async fn test_multiplier_defaults_to_two() {
        let mut fragment = Fragment::new("mx");
        fragment.set_scheduler(SchedulerConfig::event_based(2));
        let tx = fragment.add_operator(PingTx::operator("tx", 2)).unwrap();
        let fwd = fragment.add_operator(Forward::operator("fwd")).unwrap();
        let mx = fragment.add_operator(PingMx::operator("mx")).unwrap();
        let (rx_op, received) = PingRx::operator("rx");
        let rx = fragment.add_operator(rx_op).unwrap();
        fragment.add_flow(tx, fwd, PortPairs::none()).unwrap();
        fragment.add_flow(fwd, mx, PortPairs::none()).unwrap();
        fragment.add_flow(mx, rx, PortPairs::none()).unwrap();

        fragment.run_async().await.unwrap();

        assert_eq!(*received.lock(), vec![2, 4]);
    }

    #[tokio::test]
    async fn test_one_output_fans_out_to_two_inputs() {
        let mut fragment = Fragment::new("fanout");
        let tx = fragment.add_operator(PingTx::operator_on("tx", "tensor", 2)).unwrap();
        let (rx_op, received) = PingMultiRx::operator("rx", &["in1", "in2"]);
        let rx = fragment.add_operator(rx_op).unwrap();
        fragment.add_flow(tx, rx, PortPairs::set([("tensor", "in1")])).unwrap();
        fragment.add_flow(tx, rx, PortPairs::set([("tensor", "in2")])).unwrap();

        let report = fragment.run_async().await.unwrap();

        assert_eq!(*received.lock(), vec![1, 1, 2, 2]);
        assert_eq!(report.dispatches_of("rx"), 2);
    }

    #[tokio::test]
    async fn test_receiver_waits_for_every_wired_input() {
        let mut fragment = Fragment::new("half_wired");
        let tx = fragment.add_operator(PingTx::operator_on("tx", "tensor", 3)).unwrap();
        let (rx_op, received) = PingMultiRx::operator("rx", &["in1", "in2"]);
        let rx = fragment.add_operator(rx_op).unwrap();
        fragment.add_flow(tx, rx, PortPairs::set([("tensor", "in1")])).unwrap();

        let report = fragment.run_async().await.unwrap();

        assert_eq!(report.dispatches_of("tx"), 3);
        assert_eq!(report.dispatches_of("rx"), 0);
        assert!(received.lock().is_empty());
        assert_eq!(report.stop_reason, StopReason::Quiescent);
    }

    #[tokio::test]
    async fn test_unfed_receiver_is_reported_as_deadlock() {
        let mut fragment = Fragment::new("lonely");
        let (rx_op, received) = PingRx::operator("rx");
        fragment.add_operator(rx_op).unwrap();

        let report = fragment.run_async().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Deadlock);
        assert!(received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_max_duration_bounds_a_periodic_source() {
        let mut fragment = Fragment::new("periodic");
        fragment.set_scheduler(SchedulerConfig::event_based(1).with_max_duration(Duration::from_millis(120)));
        let tx = fragment
            .add_operator(
                Operator::new("tx", PingTx::new("out")).with_condition(Condition::periodic(Duration::from_millis(20))),
            )
            .unwrap();
        let (rx_op, received) = PingRx::operator("rx");
        let rx = fragment.add_operator(rx_op).unwrap();
        fragment.add_flow(tx, rx, PortPairs::none()).unwrap();

        let report = fragment.run_async().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::MaxDuration);
        assert!(!received.lock().is_empty());
        assert!(report.duration >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_controller_stops_a_running_fragment() {
        let mut fragment = Fragment::new("stoppable");
        fragment.set_scheduler(SchedulerConfig::multi_thread(2));
        let tx = fragment
            .add_operator(
                Operator::new("tx", PingTx::new("out")).with_condition(Condition::periodic(Duration::from_millis(10))),
            )
            .unwrap();
        let (rx_op, _received) = PingRx::operator("rx");
        let rx = fragment.add_operator(rx_op).unwrap();
        fragment.add_flow(tx, rx, PortPairs::none()).unwrap();
        let controller = fragment.controller();

        let run = tokio::spawn(fragment.run_async());
        tokio::time::sleep(Duration::from_millis(60)).await;
        controller.stop();
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.stop_reason, StopReason::Stopped);
        assert!(report.dispatches_of("tx") >= 1);
    }

    #[tokio::test]
    async fn test_disabled_boolean_condition_keeps_source_silent() {
        let mut fragment = Fragment::new("gated");
        let tx = fragment
            .add_operator(PingTx::operator("tx", 5).with_condition(Condition::boolean(false)))
            .unwrap();
        let (rx_op, received) = PingRx::operator("rx");
        let rx = fragment.add_operator(rx_op).unwrap();
        fragment.add_flow(tx, rx, PortPairs::none()).unwrap();

        let report = fragment.run_async().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Quiescent);
        assert_eq!(report.dispatches_of("tx"), 0);
        assert!(received.lock().is_empty());
    }

    struct Failing;

    impl OperatorLogic for Failing {
        fn setup(&self, spec: &mut OperatorSpec) {
            spec.input("in");
        }

        fn compute(
            &mut self,
            _input: &mut InputContext,
            _output: &mut OutputContext,
            _context: &mut ExecutionContext,
        ) -> Result<(), ComputeError> {
            Err("sensor offline".into())
        }
    }

    #[tokio::test]
    async fn test_compute_failure_stops_the_fragment() {
        let mut fragment = Fragment::new("broken");
        let tx = fragment.add_operator(PingTx::operator("tx", 3)).unwrap();
        let bad = fragment.add_operator(Operator::new("bad", Failing)).unwrap();
        fragment.add_flow(tx, bad, PortPairs::none()).unwrap();
        let err = fragment.run_async().await.unwrap_err();

        match err {
            ExecutionError::OperatorFailed { operator, reason } => {
                assert_eq!(operator, "bad");
                assert!(reason.contains("sensor offline"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    struct RefusesToStart;

    impl OperatorLogic for RefusesToStart {
        fn setup(&self, spec: &mut OperatorSpec) {
            spec.input("in");
        }

        fn start(&mut self) -> Result<(), ComputeError> {
            Err("device busy".into())
        }

        fn compute(
            &mut self,
            _input: &mut InputContext,
            _output: &mut OutputContext,
            _context: &mut ExecutionContext,
        ) -> Result<(), ComputeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_failure_fails_the_run_before_any_dispatch() {
        let mut fragment = Fragment::new("unstartable");
        let tx = fragment.add_operator(PingTx::operator("tx", 3)).unwrap();
        let bad = fragment.add_operator(Operator::new("bad", RefusesToStart)).unwrap();
        fragment.add_flow(tx, bad, PortPairs::none()).unwrap();

        let err = fragment.run_async().await.unwrap_err();

        match err {
            ExecutionError::InitializationFailed { component, reason } => {
                assert_eq!(component, "bad");
                assert!(reason.contains("device busy"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_operator_assigned_to_thread_pool_still_runs() {
        let (mut fragment, received) = ping_fragment(SchedulerConfig::multi_thread(2), 4);
        let rx = fragment.find_operator("rx").unwrap();
        fragment.make_thread_pool("io", 1).unwrap().add(rx, true);

        let report = fragment.run_async().await.unwrap();

        assert_eq!(*received.lock(), vec![1, 2, 3, 4]);
        assert_eq!(report.stop_reason, StopReason::Quiescent);
    }

    #[test]
    fn test_blocking_run_uses_its_own_runtime() {
        let (fragment, received) = ping_fragment(SchedulerConfig::greedy(), 2);
        let controller = fragment.controller();

        let report = fragment.run().unwrap();

        assert_eq!(*received.lock(), vec![1, 2]);
        assert!(!controller.is_stopped());
        assert_eq!(report.stop_reason, StopReason::Quiescent);
    }
}
