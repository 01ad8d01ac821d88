use crate::view::{PaddleView, RenderFrame};
use macroquad::prelude::*;
use shared::{LobbyStatus, FIELD_X_MAX, FIELD_X_MIN, FIELD_Y_MAX, FIELD_Y_MIN};

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    /// Field units to pixels; field y grows upwards, screen y downwards.
    pub fn to_screen(&self, x: f32, y: f32) -> (f32, f32) {
        let scale_x = self.width / (FIELD_X_MAX - FIELD_X_MIN);
        let scale_y = self.height / (FIELD_Y_MAX - FIELD_Y_MIN);
        (
            (x - FIELD_X_MIN) * scale_x,
            self.height - (y - FIELD_Y_MIN) * scale_y,
        )
    }

    fn scale(&self) -> f32 {
        self.width / (FIELD_X_MAX - FIELD_X_MIN)
    }

    pub fn render(&mut self, frame: &RenderFrame, alert: Option<&str>) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        self.draw_field();

        for paddle in &frame.paddles {
            self.draw_paddle(paddle);
        }

        if let Some(ball) = &frame.ball {
            let (x, y) = self.to_screen(ball.x, ball.y);
            draw_circle(x, y, ball.radius * self.scale(), WHITE);
        }

        self.draw_scores(frame);
        self.draw_banner(frame, alert);
        self.draw_ui(frame);
    }

    fn draw_field(&mut self) {
        let center = self.width / 2.0;
        let dash = 12.0;
        let mut y = 0.0;
        while y < self.height {
            draw_line(center, y, center, y + dash, 2.0, Color::from_rgba(68, 68, 68, 255));
            y += dash * 2.0;
        }
        draw_rectangle_lines(0.0, 0.0, self.width, self.height, 2.0, Color::from_rgba(68, 68, 68, 255));
    }

    fn draw_paddle(&mut self, paddle: &PaddleView) {
        let scale = self.scale();
        let (cx, cy) = self.to_screen(paddle.x, paddle.y);
        let w = paddle.width * scale;
        let h = paddle.height * scale;

        let color = if paddle.local {
            GREEN
        } else {
            Color::from_rgba(
                ((paddle.color >> 16) & 0xFF) as u8,
                ((paddle.color >> 8) & 0xFF) as u8,
                (paddle.color & 0xFF) as u8,
                255,
            )
        };

        draw_rectangle(cx - w / 2.0, cy - h / 2.0, w, h, color);
        draw_rectangle_lines(cx - w / 2.0, cy - h / 2.0, w, h, 2.0, WHITE);
    }

    fn draw_scores(&mut self, frame: &RenderFrame) {
        let text = format!("{}   {}", frame.scores.a, frame.scores.b);
        let size = measure_text(&text, None, 48, 1.0);
        draw_text(&text, self.width / 2.0 - size.width / 2.0, 56.0, 48.0, WHITE);
    }

    fn draw_banner(&mut self, frame: &RenderFrame, alert: Option<&str>) {
        let message = match (alert, frame.status, frame.countdown) {
            (Some(alert), _, _) => alert.to_string(),
            (None, Some(LobbyStatus::Ended), _) => "Match over".to_string(),
            (None, Some(LobbyStatus::ToSetup), Some(count)) if count > 0 => count.to_string(),
            (None, Some(LobbyStatus::ToSetup), _) | (None, None, _) => {
                "Waiting for opponent...".to_string()
            }
            _ => return,
        };

        let size = measure_text(&message, None, 32, 1.0);
        draw_text(
            &message,
            self.width / 2.0 - size.width / 2.0,
            self.height / 2.0,
            32.0,
            YELLOW,
        );
    }

    fn draw_ui(&mut self, frame: &RenderFrame) {
        let y_start = self.height - 24.0;

        let connection_color = if frame.slow_connection { RED } else { GREEN };
        draw_rectangle(10.0, y_start, 8.0, 8.0, connection_color);
        draw_text("CON", 20.0, y_start + 8.0, 12.0, WHITE);

        let Some(round_trip) = frame.round_trip else {
            return;
        };
        let ping = round_trip.as_millis() as u64;
        let ping_bars = ((ping / 20).min(10)) as i32;
        let ping_y = y_start + 12.0;

        for i in 0..10i32 {
            let bar_color = if i < ping_bars {
                if ping < 50 {
                    GREEN
                } else if ping < 200 {
                    YELLOW
                } else {
                    RED
                }
            } else {
                Color::from_rgba(51, 51, 51, 255)
            };

            draw_rectangle(10.0 + (i as f32) * 3.0, ping_y, 2.0, 8.0, bar_color);
        }

        draw_text(&format!("{}ms", ping), 45.0, ping_y + 8.0, 12.0, WHITE);
    }
}
