use std::path::Path;

use eframe::egui;
use egui_plot::{Line, Plot, PlotPoints};
use nalgebra::DVector;

use nes_sim::config::RunConfig;
use nes_sim::dynamics::state::REF_LENGTH;
use nes_sim::dynamics::NesModel;
use nes_sim::sim;

/// Points kept per plot.
const MAX_POINTS: usize = 4000;

fn main() -> eframe::Result {
    // optional TOML run configuration as the only argument
    let cfg = match std::env::args().nth(1) {
        Some(path) => RunConfig::load(Path::new(&path)),
        None => Ok(RunConfig::default()),
    };
    let loaded = cfg.and_then(|c| {
        let model = c.build_model()?;
        let every = (model.time_grid().num_steps() / MAX_POINTS).max(1);
        let (result, samples) = sim::run_sampled(&model, every)?;
        Ok((model, samples, result))
    });
    let (model, samples, result) = match loaded {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let app = NesViz { model, samples, rms: result.rms, peak: result.peak };
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native("NES Response", options, Box::new(|_| Ok(Box::new(app))))
}

struct NesViz {
    model: NesModel,
    samples: Vec<DVector<f64>>,
    rms: f64,
    peak: f64,
}

impl NesViz {
    /// (tao, value / D) for state index `i`.
    fn series(&self, i: usize) -> PlotPoints {
        let f_n = self.model.structure().natural_frequency();
        self.samples
            .iter()
            .map(|s| [s[0] * f_n, s[i] / REF_LENGTH])
            .collect::<Vec<_>>()
            .into()
    }
}

impl eframe::App for NesViz {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let layout = self.model.layout();
        let s = self.model.structure();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.heading(format!(
                "{} absorber(s)  |  f_n {:.4} Hz  |  U* {:.1}",
                self.model.absorber_count(),
                s.natural_frequency(),
                s.u_star()
            ));
            ui.label(format!(
                "Settling window: RMS {:.4e}  |  peak {:.4e}  (displacement / D)",
                self.rms, self.peak
            ));
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let available = ui.available_size();
            let half_w = available.x / 2.0 - 8.0;
            let half_h = available.y / 2.0 - 8.0;

            ui.horizontal(|ui| {
                // Main displacement vs tao
                ui.vertical(|ui| {
                    ui.label("Main displacement (y / D)");
                    Plot::new("main")
                        .width(half_w)
                        .height(half_h)
                        .x_axis_label("tao")
                        .show(ui, |plot_ui| {
                            plot_ui.line(Line::new("y", self.series(1)));
                        });
                });

                // Absorber displacements vs tao
                ui.vertical(|ui| {
                    ui.label("Absorber displacement (r / D)");
                    Plot::new("absorbers")
                        .width(half_w)
                        .height(half_h)
                        .x_axis_label("tao")
                        .show(ui, |plot_ui| {
                            for i in 0..layout.absorbers() {
                                let name = format!("r{}", i + 1);
                                plot_ui.line(Line::new(name, self.series(layout.absorber_displacement(i))));
                            }
                        });
                });
            });

            ui.horizontal(|ui| {
                // Relative displacement (stroke) vs tao
                ui.vertical(|ui| {
                    ui.label("Stroke ((y - r) / D)");
                    let f_n = s.natural_frequency();
                    Plot::new("stroke")
                        .width(half_w)
                        .height(half_h)
                        .x_axis_label("tao")
                        .show(ui, |plot_ui| {
                            for i in 0..layout.absorbers() {
                                let points: PlotPoints = self
                                    .samples
                                    .iter()
                                    .map(|st| {
                                        let rel = st[1] - st[layout.absorber_displacement(i)];
                                        [st[0] * f_n, rel / REF_LENGTH]
                                    })
                                    .collect();
                                plot_ui.line(Line::new(format!("stroke {}", i + 1), points));
                            }
                        });
                });

                // Phase portrait of the main structure
                ui.vertical(|ui| {
                    ui.label("Phase portrait (y / D, v / (omega D))");
                    let inv_omega = self.model.aero_factors().inv_omega;
                    let points: PlotPoints = self
                        .samples
                        .iter()
                        .map(|st| {
                            [
                                st[1] / REF_LENGTH,
                                st[layout.main_velocity()] * inv_omega / REF_LENGTH,
                            ]
                        })
                        .collect();
                    Plot::new("phase")
                        .width(half_w)
                        .height(half_h)
                        .x_axis_label("y / D")
                        .data_aspect(1.0)
                        .show(ui, |plot_ui| {
                            plot_ui.line(Line::new("orbit", points));
                        });
                });
            });
        });
    }
}
