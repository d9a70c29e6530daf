use chrono::Local;
use weather_core::{
    FavoritesList, ForecastEntry, SearchState, SearchStatus, WeatherState,
    model::{Condition, Readings, Wind},
};

fn temperature_unit(units: &str) -> &'static str {
    match units {
        "imperial" => "°F",
        "standard" => "K",
        _ => "°C",
    }
}

fn speed_unit(units: &str) -> &'static str {
    match units {
        "imperial" => "mph",
        _ => "m/s",
    }
}

fn describe(conditions: &[Condition]) -> &str {
    conditions.first().map(|c| c.description.as_str()).unwrap_or("-")
}

fn format_wind(wind: Option<&Wind>, units: &str) -> String {
    match wind.and_then(|w| w.speed.map(|s| (s, w.deg))) {
        Some((speed, Some(deg))) => format!("{speed:.1} {} from {deg}°", speed_unit(units)),
        Some((speed, None)) => format!("{speed:.1} {}", speed_unit(units)),
        None => "-".to_string(),
    }
}

fn format_range(readings: &Readings, units: &str) -> String {
    let unit = temperature_unit(units);
    format!("{:.0}{unit} / {:.0}{unit}", readings.temp_max, readings.temp_min)
}

fn print_slot(entry: &ForecastEntry, units: &str) {
    let local = entry.time().with_timezone(&Local);
    println!(
        "  {}  {:>5.1}{}  {}",
        local.format("%a %H:%M"),
        entry.readings.temperature,
        temperature_unit(units),
        describe(&entry.conditions)
    );
}

pub fn print_weather(state: &WeatherState, units: &str, details: bool) {
    if let Some(error) = &state.error {
        eprintln!("Error: {error}");
        if state.show_settings_alert {
            eprintln!("Pass --lat and --lon to use your location, or name a city.");
        }
    }

    let Some(weather) = &state.current_weather else {
        return;
    };

    println!("{} ({})", state.current_city, weather.country);
    println!(
        "  {:.1}{}, {}",
        weather.readings.temperature,
        temperature_unit(units),
        describe(&weather.conditions)
    );
    println!("  High / low: {}", format_range(&weather.readings, units));
    println!("  Humidity:   {}%", weather.readings.humidity);
    println!("  Pressure:   {} hPa", weather.readings.pressure);
    println!("  Wind:       {}", format_wind(weather.wind.as_ref(), units));

    if !state.forecast.near_term.is_empty() {
        println!();
        println!("Next 24 hours:");
        for entry in &state.forecast.near_term {
            print_slot(entry, units);
        }
    }

    if !state.forecast.daily.is_empty() {
        println!();
        println!("Daily outlook:");
        for entry in &state.forecast.daily {
            let local = entry.time().with_timezone(&Local);
            println!(
                "  {}  {}  {}",
                local.format("%a %d %b"),
                format_range(&entry.readings, units),
                describe(&entry.conditions)
            );
            if details {
                for slot in state.forecast.day_of(entry, &Local) {
                    print_slot(slot, units);
                }
            }
        }
    }
}

pub fn print_search(state: &SearchState) {
    match &state.status {
        SearchStatus::NoCityFound => println!("No city found for \"{}\"", state.query),
        SearchStatus::Failed(error) => eprintln!("Error: {error}"),
        _ => {}
    }

    for city in &state.results {
        if city.subtitle.is_empty() {
            println!("{}  ({})", city.title, city.coordinate);
        } else {
            println!("{}, {}  ({})", city.title, city.subtitle, city.coordinate);
        }
    }
}

pub fn print_favorites(list: &FavoritesList) {
    if list.is_empty() {
        println!("No favorites yet. Add one with `weather favorites toggle CITY`.");
        return;
    }

    for (index, favorite) in list.items().iter().enumerate() {
        println!(
            "{index:>3}  {}, {}  ({})",
            favorite.name,
            favorite.country,
            favorite.coordinate()
        );
    }
}
