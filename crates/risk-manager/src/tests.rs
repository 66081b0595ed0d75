#[cfg(test)]
mod risk_engine_tests {
    use crate::engine::{PlanLevels, RiskEngine};
    use crate::error::RiskError;
    use crate::models::{RiskParameters, RiskRewardVerdict, VolatilitySource};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use signal_core::{MarketSnapshot, PositionType, SignalAdjustments, SymbolKey, Timeframe};

    fn snapshot(price: f64, atr: Option<f64>) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::new(&SymbolKey::new("BTCUSDT", Timeframe::Hour4), price);
        snapshot.technical.atr = atr;
        snapshot
    }

    fn levels(position_type: PositionType, entry: Decimal, stop_loss: Decimal) -> PlanLevels {
        PlanLevels {
            position_type,
            entry,
            stop_loss,
            take_profits: None,
            account_balance: dec!(10000),
            max_risk_fraction: dec!(0.02),
            volatility_source: VolatilitySource::Manual,
        }
    }

    #[test]
    fn long_plan_from_atr() {
        let engine = RiskEngine::default();
        let plan = engine
            .build_risk_plan(&snapshot(90_000.0, Some(1200.0)), PositionType::Long, dec!(10000), None)
            .unwrap();

        assert_eq!(plan.entry, dec!(90000));
        assert_eq!(plan.stop_loss, dec!(88200));
        assert_eq!(plan.stop_distance, dec!(1800));
        assert_eq!(plan.max_loss, dec!(200));
        assert_eq!(plan.position_size, dec!(0.11111111));
        assert_eq!(plan.volatility_source, VolatilitySource::Atr);
        assert_eq!(
            plan.take_profits.prices(),
            [dec!(92700), dec!(94500), dec!(97200)]
        );
        assert_eq!(plan.take_profits.total_allocation(), 100);
        assert!((plan.risk_reward - 2.3).abs() < 1e-9);
        assert_eq!(plan.verdict, RiskRewardVerdict::MeetsMinimum);
    }

    #[test]
    fn loss_at_stop_never_exceeds_max_loss() {
        let engine = RiskEngine::default();
        for (price, atr) in [(90_000.0, 1200.0), (3.17, 0.09), (0.0004512, 0.0000311), (187.4, 4.2)] {
            for side in [PositionType::Long, PositionType::Short] {
                let plan = engine
                    .build_risk_plan(&snapshot(price, Some(atr)), side, dec!(25000), None)
                    .unwrap();
                assert!(plan.loss_at_stop() <= plan.max_loss);
                let gap = plan.max_loss - plan.loss_at_stop();
                assert!(gap <= plan.stop_distance * dec!(0.00000001), "gap {} too large", gap);
            }
        }
    }

    #[test]
    fn short_plan_inverts_sides() {
        let engine = RiskEngine::default();
        let plan = engine
            .build_risk_plan(&snapshot(90_000.0, Some(1200.0)), PositionType::Short, dec!(10000), None)
            .unwrap();

        assert_eq!(plan.stop_loss, dec!(91800));
        assert_eq!(
            plan.take_profits.prices(),
            [dec!(87300), dec!(85500), dec!(82800)]
        );
        assert_eq!(plan.position_size, dec!(0.11111111));
        assert!((plan.risk_reward - 2.3).abs() < 1e-9);
    }

    #[test]
    fn stop_distance_is_clamped() {
        let engine = RiskEngine::default();

        // 1.5 x 20 = 30 on 90k is under the 0.5% floor
        let tight = engine
            .build_risk_plan(&snapshot(90_000.0, Some(20.0)), PositionType::Long, dec!(10000), None)
            .unwrap();
        assert_eq!(tight.stop_distance, dec!(450));

        // 1.5 x 8000 = 12000 is over the 10% ceiling
        let wide = engine
            .build_risk_plan(&snapshot(90_000.0, Some(8000.0)), PositionType::Long, dec!(10000), None)
            .unwrap();
        assert_eq!(wide.stop_distance, dec!(9000));
    }

    #[test]
    fn volatility_fallbacks() {
        let engine = RiskEngine::default();

        let mut with_vol = snapshot(1000.0, None);
        with_vol.risk.volatility_pct = Some(3.0);
        let plan = engine
            .build_risk_plan(&with_vol, PositionType::Long, dec!(10000), None)
            .unwrap();
        assert_eq!(plan.volatility_source, VolatilitySource::RealizedVolatility);
        assert_eq!(plan.stop_loss, dec!(970));

        let plan = engine
            .build_risk_plan(&snapshot(1000.0, None), PositionType::Long, dec!(10000), None)
            .unwrap();
        assert_eq!(plan.volatility_source, VolatilitySource::Fallback);
        assert_eq!(plan.stop_loss, dec!(980));
    }

    #[test]
    fn custom_risk_fraction() {
        let engine = RiskEngine::default();
        let plan = engine
            .build_risk_plan(
                &snapshot(90_000.0, Some(1200.0)),
                PositionType::Long,
                dec!(10000),
                Some(dec!(0.01)),
            )
            .unwrap();
        assert_eq!(plan.max_loss, dec!(100));
        assert_eq!(plan.position_size, dec!(0.05555555));
    }

    #[test]
    fn poor_ratio_is_flagged_not_refused() {
        let engine = RiskEngine::default();
        let plan = engine
            .plan(PlanLevels {
                take_profits: Some([dec!(101), dec!(102), dec!(103)]),
                ..levels(PositionType::Long, dec!(100), dec!(98))
            })
            .unwrap();
        // (1*50 + 2*30 + 3*20) / 100 = 1.7 over a risk of 2
        assert!((plan.risk_reward - 0.85).abs() < 1e-9);
        assert_eq!(plan.verdict, RiskRewardVerdict::Unfavorable);
    }

    #[test]
    fn invalid_inputs_rejected() {
        let engine = RiskEngine::default();

        let wrong_side = engine.plan(levels(PositionType::Long, dec!(100), dec!(101)));
        assert!(matches!(wrong_side, Err(RiskError::InvalidPrice(_))));

        let wrong_side_short = engine.plan(levels(PositionType::Short, dec!(100), dec!(99)));
        assert!(matches!(wrong_side_short, Err(RiskError::InvalidPrice(_))));

        let no_balance = engine.plan(PlanLevels {
            account_balance: Decimal::ZERO,
            ..levels(PositionType::Long, dec!(100), dec!(98))
        });
        assert_eq!(no_balance, Err(RiskError::InvalidAccountBalance(Decimal::ZERO)));

        let bad_fraction = engine.plan(PlanLevels {
            max_risk_fraction: dec!(1.5),
            ..levels(PositionType::Long, dec!(100), dec!(98))
        });
        assert_eq!(bad_fraction, Err(RiskError::InvalidRiskFraction(dec!(1.5))));

        let bad_target = engine.plan(PlanLevels {
            take_profits: Some([dec!(103), dec!(99), dec!(110)]),
            ..levels(PositionType::Long, dec!(100), dec!(98))
        });
        assert!(matches!(bad_target, Err(RiskError::InvalidTarget(_))));

        let no_price = engine.build_risk_plan(&snapshot(0.0, None), PositionType::Long, dec!(1000), None);
        assert!(matches!(no_price, Err(RiskError::InvalidPrice(_))));
    }

    #[test]
    fn reviewer_targets_are_ordered() {
        let engine = RiskEngine::default();
        let plan = engine
            .plan(PlanLevels {
                take_profits: Some([dec!(90), dec!(96), dec!(94)]),
                ..levels(PositionType::Short, dec!(100), dec!(102))
            })
            .unwrap();
        assert_eq!(plan.take_profits.prices(), [dec!(96), dec!(94), dec!(90)]);
        assert_eq!(plan.take_profits.tp1.allocation, 50);
    }

    #[test]
    fn replan_moves_entry_and_keeps_distance() {
        let engine = RiskEngine::default();
        let base = engine
            .build_risk_plan(&snapshot(90_000.0, Some(1200.0)), PositionType::Long, dec!(10000), None)
            .unwrap();

        let moved = engine
            .replan(
                &base,
                &SignalAdjustments {
                    entry: Some(dec!(89000)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(moved.stop_loss, dec!(87200));
        assert_eq!(moved.take_profits.tp1.price, dec!(91700));
        assert_eq!(moved.position_size, base.position_size);

        let manual = engine
            .replan(
                &base,
                &SignalAdjustments {
                    stop_loss: Some(dec!(89000)),
                    account_balance: Some(dec!(20000)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(manual.volatility_source, VolatilitySource::Manual);
        assert_eq!(manual.max_loss, dec!(400));
        assert_eq!(manual.position_size, dec!(0.4));
        assert_eq!(manual.take_profits.total_allocation(), 100);
    }

    #[test]
    fn replan_without_changes_is_identity() {
        let engine = RiskEngine::default();
        let base = engine
            .build_risk_plan(&snapshot(90_000.0, Some(1200.0)), PositionType::Long, dec!(10000), None)
            .unwrap();
        let same = engine.replan(&base, &SignalAdjustments::default()).unwrap();
        assert_eq!(same, base);
    }

    #[test]
    fn invalid_parameters_rejected() {
        let params = RiskParameters {
            take_profit_multiples: [dec!(2), dec!(1.5), dec!(4)],
            ..Default::default()
        };
        assert!(matches!(RiskEngine::new(params), Err(RiskError::InvalidConfig(_))));

        let params = RiskParameters {
            max_risk_fraction: Decimal::ZERO,
            ..Default::default()
        };
        assert!(RiskEngine::new(params).is_err());
    }

    #[test]
    fn unit_price_stop_stays_off_entry() {
        let engine = RiskEngine::default();

        let long = engine
            .build_risk_plan(&snapshot(1.0, Some(0.0005)), PositionType::Long, dec!(10000), None)
            .unwrap();
        assert_eq!(long.stop_distance, dec!(0.005));
        assert_eq!(long.stop_loss, dec!(0.995));
        assert_eq!(
            long.take_profits.prices(),
            [dec!(1.0075), dec!(1.0125), dec!(1.02)]
        );
        assert_eq!(long.position_size, dec!(40000));

        let short = engine
            .build_risk_plan(&snapshot(1.0, Some(0.0005)), PositionType::Short, dec!(10000), None)
            .unwrap();
        assert_eq!(short.stop_loss, dec!(1.005));
        assert_eq!(short.take_profits.tp1.price, dec!(0.9925));
    }

    #[test]
    fn oversized_inputs_are_errors() {
        let engine = RiskEngine::default();

        let mut wild = snapshot(95_000.0, None);
        wild.risk.volatility_pct = Some(1e27);
        let plan = engine.build_risk_plan(&wild, PositionType::Long, dec!(10000), None);
        assert!(matches!(plan, Err(RiskError::Overflow(_))));

        let huge_balance = engine.plan(PlanLevels {
            account_balance: Decimal::MAX,
            ..levels(PositionType::Long, dec!(0.0004), dec!(0.0003999))
        });
        assert!(matches!(huge_balance, Err(RiskError::Overflow(_))));

        let far_target = engine.plan(PlanLevels {
            take_profits: Some([dec!(101), dec!(102), Decimal::MAX]),
            ..levels(PositionType::Long, dec!(100), dec!(98))
        });
        assert!(matches!(far_target, Err(RiskError::Overflow(_))));
    }
}
